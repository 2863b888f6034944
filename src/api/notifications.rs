/// Notification and push-token endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{AuraError, AuraResult},
    social::NotificationView,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/unread", get(unread_count))
        .route("/v1/notifications/read", post(mark_read))
        .route("/v1/push-token", put(register_push_token).delete(remove_push_token))
}

#[derive(Debug, Default, Deserialize)]
struct MarkReadRequest {
    ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PushTokenRequest {
    token: String,
}

/// Read-only; clients clear the badge with `POST /v1/notifications/read`
async fn list_notifications(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<NotificationView>>> {
    let notifications = ctx.social.list_notifications(&auth.uid).await?;
    Ok(Json(notifications))
}

async fn unread_count(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<serde_json::Value>> {
    let count = ctx.social.unread_notification_count(&auth.uid).await?;
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    body: Option<Json<MarkReadRequest>>,
) -> AuraResult<Json<serde_json::Value>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let updated = ctx
        .social
        .mark_notifications_read(&auth.uid, req.ids.as_deref())
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn register_push_token(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<PushTokenRequest>,
) -> AuraResult<StatusCode> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AuraError::Validation("Push token cannot be empty".to_string()));
    }
    ctx.push_tokens.register(&auth.uid, token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_push_token(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<StatusCode> {
    ctx.push_tokens.remove(&auth.uid).await?;
    Ok(StatusCode::NO_CONTENT)
}
