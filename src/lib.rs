//! Aura - social backend
//!
//! Profiles, posts, follows, likes, comments, stories, direct messages and
//! notifications over a SQLite store, with live subscriptions and device
//! push.

pub mod account;
pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod live;
pub mod metrics;
pub mod push;
pub mod rate_limit;
pub mod server;
pub mod social;
