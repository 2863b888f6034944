/// Unified error types for the Aura server
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum AuraError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., username already taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A transaction kept losing to concurrent writers
    #[error("Write contention: {0}")]
    Contention(String),

    /// Media storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Push gateway errors
    #[error("Push error: {0}")]
    Push(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<validator::ValidationErrors> for AuraError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuraError::Validation(errors.to_string())
    }
}

/// Convert AuraError to HTTP response
impl IntoResponse for AuraError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            AuraError::Authentication(_) | AuraError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            AuraError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            AuraError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            AuraError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AuraError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            AuraError::Contention(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Contention",
                "Too many concurrent writes, try again".to_string(),
            ),
            AuraError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            AuraError::Database(_)
            | AuraError::Migration(_)
            | AuraError::Internal(_)
            | AuraError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            AuraError::Storage(_) | AuraError::Push(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for server operations
pub type AuraResult<T> = Result<T, AuraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AuraError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (AuraError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (AuraError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AuraError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AuraError::Conflict("x".into()), StatusCode::CONFLICT),
            (AuraError::Contention("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AuraError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_details_not_leaked() {
        let response = AuraError::Internal("secret path /var/db".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.error, "InternalServerError");
        assert!(!body.message.contains("/var/db"));
    }
}
