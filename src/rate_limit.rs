/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{AuraError, AuraResult},
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn non_zero(value: u32, fallback: NonZeroU32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(fallback)
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated_rps: u32,
    unauthenticated_rps: u32,
    authenticated: Arc<DirectLimiter>,
    unauthenticated: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let auth_quota = Quota::per_second(non_zero(config.authenticated_rps, NonZeroU32::MIN))
            .allow_burst(non_zero(config.burst_size, NonZeroU32::MIN));

        let unauth_quota = Quota::per_second(non_zero(config.unauthenticated_rps, NonZeroU32::MIN))
            .allow_burst(non_zero(config.burst_size / 5, NonZeroU32::MIN));

        Self {
            enabled: config.enabled,
            authenticated_rps: config.authenticated_rps,
            unauthenticated_rps: config.unauthenticated_rps,
            authenticated: Arc::new(GovernorLimiter::direct(auth_quota)),
            unauthenticated: Arc::new(GovernorLimiter::direct(unauth_quota)),
        }
    }

    fn check(&self, limiter: &DirectLimiter) -> AuraResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| AuraError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    /// Check rate limit for authenticated user
    pub fn check_authenticated(&self) -> AuraResult<()> {
        self.check(&self.authenticated)
    }

    /// Check rate limit for unauthenticated user
    pub fn check_unauthenticated(&self) -> AuraResult<()> {
        self.check(&self.unauthenticated)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AuraError> {
    let has_auth_header = request.headers().get("authorization").is_some();

    let limit = if has_auth_header {
        ctx.rate_limiter.check_authenticated()?;
        ctx.rate_limiter.authenticated_rps
    } else {
        ctx.rate_limiter.check_unauthenticated()?;
        ctx.rate_limiter.unauthenticated_rps
    };

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert("X-RateLimit-Limit", HeaderValue::from(limit));

    Ok(response)
}
