/// Authentication extractors
use crate::{
    account::ValidatedSession, api::middleware::extract_bearer_token, context::AppContext,
    error::AuraError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: String,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuraError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AuraError::Authentication("Missing authorization header".to_string()))?;

        let session = state
            .account_manager
            .validate_access_token(&token)
            .await?;

        Ok(AuthContext {
            uid: session.uid.clone(),
            session,
        })
    }
}
