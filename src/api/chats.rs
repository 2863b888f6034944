/// Direct message endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::AuraResult,
    social::{Chat, ChatView, Message},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/chats", get(list_chats).post(open_chat))
        .route("/v1/chats/:id", get(get_chat))
        .route("/v1/chats/:id/messages", get(list_messages).post(send_message))
}

#[derive(Debug, Deserialize)]
struct OpenChatRequest {
    uid: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    text: String,
}

async fn list_chats(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<ChatView>>> {
    Ok(Json(ctx.social.list_chats(&auth.uid).await?))
}

async fn open_chat(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<OpenChatRequest>,
) -> AuraResult<Json<Chat>> {
    Ok(Json(ctx.social.open_chat(&auth.uid, &req.uid).await?))
}

async fn get_chat(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<Chat>> {
    Ok(Json(ctx.social.get_chat(&auth.uid, &id).await?))
}

async fn list_messages(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<Vec<Message>>> {
    Ok(Json(ctx.social.list_messages(&auth.uid, &id).await?))
}

async fn send_message(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> AuraResult<(StatusCode, Json<Message>)> {
    let message = ctx.social.send_message(&auth.uid, &id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
