/// Home feed and story endpoints
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::AuraResult,
    social::{FeedItem, NewStory, Story, StoryView},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/feed", get(home_feed))
        .route("/v1/stories", get(story_bar).post(create_story))
        .route("/v1/profiles/:uid/stories", get(profile_stories))
}

async fn home_feed(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<FeedItem>>> {
    Ok(Json(ctx.social.home_feed(&auth.uid).await?))
}

async fn story_bar(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<Vec<StoryView>>> {
    Ok(Json(ctx.social.active_stories_for_viewer(&auth.uid).await?))
}

async fn create_story(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(new): Json<NewStory>,
) -> AuraResult<(StatusCode, Json<Story>)> {
    let story = ctx.social.create_story(&auth.uid, new).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

async fn profile_stories(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(uid): Path<String>,
) -> AuraResult<Json<Vec<Story>>> {
    let profile = ctx.social.get_profile(&uid).await?;
    ctx.social.ensure_can_view(&auth.uid, &profile).await?;
    Ok(Json(ctx.social.list_active_stories_by_author(&uid).await?))
}
