/// Post, like and comment endpoints
use crate::{
    api::SetStateRequest,
    auth::AuthContext,
    context::AppContext,
    error::AuraResult,
    social::{Comment, CommentView, FeedItem, NewPost, Post, RelationshipChange},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/posts", post(create_post))
        .route("/v1/posts/:id", get(get_post))
        .route("/v1/profiles/:uid/posts", get(list_profile_posts))
        .route(
            "/v1/posts/:id/like",
            get(like_state).post(toggle_like).put(set_like),
        )
        .route("/v1/posts/:id/comments", get(list_comments).post(add_comment))
        .route("/v1/me/comments", get(my_comments))
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    text: String,
}

async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(new): Json<NewPost>,
) -> AuraResult<(StatusCode, Json<Post>)> {
    let post = ctx.social.create_post(&auth.uid, new).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<FeedItem>> {
    let post = ctx.social.get_post_for(&auth.uid, &id).await?;
    let author = ctx.social.get_profile(&post.author_id).await?;
    let liked_by_viewer = ctx.social.has_liked(&auth.uid, &id).await?;

    Ok(Json(FeedItem {
        post: post.masked_for(&auth.uid),
        author,
        liked_by_viewer,
    }))
}

async fn list_profile_posts(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<Vec<Post>>> {
    let posts = ctx.social.list_posts_by_author(&auth.uid, &uid).await?;
    Ok(Json(
        posts
            .into_iter()
            .map(|post| post.masked_for(&auth.uid))
            .collect(),
    ))
}

async fn like_state(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<serde_json::Value>> {
    ctx.social.get_post_for(&auth.uid, &id).await?;
    let liked = ctx.social.has_liked(&auth.uid, &id).await?;
    Ok(Json(json!({ "liked": liked })))
}

async fn toggle_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<RelationshipChange>> {
    ctx.social.get_post_for(&auth.uid, &id).await?;
    Ok(Json(ctx.social.toggle_like(&auth.uid, &id).await?))
}

async fn set_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<SetStateRequest>,
) -> AuraResult<Json<RelationshipChange>> {
    ctx.social.get_post_for(&auth.uid, &id).await?;
    Ok(Json(ctx.social.set_like(&auth.uid, &id, req.active).await?))
}

async fn list_comments(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> AuraResult<Json<Vec<CommentView>>> {
    Ok(Json(ctx.social.list_comments(&auth.uid, &id).await?))
}

async fn add_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AuraResult<(StatusCode, Json<Comment>)> {
    ctx.social.get_post_for(&auth.uid, &id).await?;
    let comment = ctx.social.add_comment(&auth.uid, &id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn my_comments(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<CommentView>>> {
    Ok(Json(ctx.social.comments_by_author(&auth.uid).await?))
}
