/// Background task implementations
use crate::{context::AppContext, error::AuraResult};

/// Delete sessions whose refresh token has expired
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> AuraResult<u64> {
    ctx.account_manager.cleanup_expired_sessions().await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> AuraResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    let receivers = ctx.change_bus.receiver_count();
    tracing::debug!(live_receivers = receivers, "Health check passed");

    Ok(())
}
