/// Account and session endpoints
use crate::{
    account::{
        Account, ChangePasswordRequest, LoginRequest, RefreshSessionRequest, SessionResponse,
        SignupRequest,
    },
    auth::AuthContext,
    context::AppContext,
    error::AuraResult,
    social::Profile,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/auth/signup", post(signup))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/session", get(get_session))
        .route("/v1/auth/password", post(change_password))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupResponse {
    session: SessionResponse,
    profile: Profile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    account: Account,
    profile: Profile,
}

async fn signup(
    State(ctx): State<AppContext>,
    Json(req): Json<SignupRequest>,
) -> AuraResult<(StatusCode, Json<SignupResponse>)> {
    req.validate()?;

    let (account, profile) = ctx
        .account_manager
        .create_account(&req.email, &req.password, &req.username)
        .await?;
    let session = ctx.account_manager.create_session(&account.uid).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            session: session.into(),
            profile,
        }),
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AuraResult<Json<SessionResponse>> {
    req.validate()?;

    let (_, session) = ctx.account_manager.login(&req.email, &req.password).await?;
    Ok(Json(session.into()))
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshSessionRequest>,
) -> AuraResult<Json<SessionResponse>> {
    req.validate()?;

    let session = ctx.account_manager.refresh_session(&req.refresh_jwt).await?;
    Ok(Json(session.into()))
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> AuraResult<StatusCode> {
    ctx.account_manager
        .delete_session(&auth.session.session_id)
        .await?;
    tracing::info!(uid = %auth.uid, "Logout");
    Ok(StatusCode::NO_CONTENT)
}

async fn get_session(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AuraResult<Json<SessionInfo>> {
    let account = ctx.account_manager.get_account(&auth.uid).await?;
    let profile = ctx.social.get_profile(&auth.uid).await?;
    Ok(Json(SessionInfo { account, profile }))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> AuraResult<Json<serde_json::Value>> {
    req.validate()?;

    let revoked = ctx
        .account_manager
        .change_password(
            &auth.uid,
            &auth.session.session_id,
            &req.current_password,
            &req.new_password,
        )
        .await?;

    Ok(Json(json!({ "revokedSessions": revoked })))
}
