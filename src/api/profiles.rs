/// Profile and follow endpoints
use crate::{
    api::SetStateRequest,
    auth::AuthContext,
    context::AppContext,
    error::AuraResult,
    social::{Profile, ProfileUpdate, RelationshipChange},
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/profile", get(get_own_profile).put(update_profile))
        .route("/v1/profiles/search", get(search_profiles))
        .route("/v1/profiles/suggestions", get(suggested_profiles))
        .route("/v1/profiles/:uid", get(get_profile))
        .route("/v1/users/:username", get(get_profile_by_username))
        .route("/v1/profiles/:uid/followers", get(list_followers))
        .route("/v1/profiles/:uid/following", get(list_following))
        .route(
            "/v1/profiles/:uid/follow",
            get(follow_state).post(toggle_follow).put(set_follow),
        )
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn get_own_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Profile>> {
    Ok(Json(ctx.social.get_profile(&auth.uid).await?))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(update): Json<ProfileUpdate>,
) -> AuraResult<Json<Profile>> {
    Ok(Json(ctx.social.update_profile(&auth.uid, update).await?))
}

async fn get_profile(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<Profile>> {
    Ok(Json(ctx.social.get_profile(&uid).await?))
}

async fn get_profile_by_username(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(username): Path<String>,
) -> AuraResult<Json<Profile>> {
    Ok(Json(ctx.social.get_profile_by_username(&username).await?))
}

async fn search_profiles(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Query(params): Query<SearchParams>,
) -> AuraResult<Json<Vec<Profile>>> {
    Ok(Json(ctx.social.search_profiles(&params.q).await?))
}

async fn suggested_profiles(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<Profile>>> {
    Ok(Json(ctx.social.suggested_profiles(&auth.uid).await?))
}

async fn list_followers(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<Vec<Profile>>> {
    let profile = ctx.social.get_profile(&uid).await?;
    ctx.social.ensure_can_view(&auth.uid, &profile).await?;
    Ok(Json(ctx.social.list_followers(&uid).await?))
}

async fn list_following(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<Vec<Profile>>> {
    let profile = ctx.social.get_profile(&uid).await?;
    ctx.social.ensure_can_view(&auth.uid, &profile).await?;
    Ok(Json(ctx.social.list_following(&uid).await?))
}

async fn follow_state(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<serde_json::Value>> {
    let following = ctx.social.is_following(&auth.uid, &uid).await?;
    Ok(Json(json!({ "following": following })))
}

async fn toggle_follow(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<RelationshipChange>> {
    Ok(Json(ctx.social.toggle_following(&auth.uid, &uid).await?))
}

async fn set_follow(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
    Json(req): Json<SetStateRequest>,
) -> AuraResult<Json<RelationshipChange>> {
    Ok(Json(
        ctx.social.set_following(&auth.uid, &uid, req.active).await?,
    ))
}
