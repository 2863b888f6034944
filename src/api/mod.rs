/// API routes and handlers
pub mod auth;
pub mod chats;
pub mod feed;
pub mod live;
pub mod media;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod profiles;

use crate::context::AppContext;
use axum::Router;
use serde::{Deserialize, Serialize};

/// Body of the `PUT` desired-state endpoints (follow, like)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub active: bool,
}

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(profiles::routes())
        .merge(posts::routes())
        .merge(feed::routes())
        .merge(notifications::routes())
        .merge(chats::routes())
        .merge(media::routes())
        .merge(live::routes())
}
