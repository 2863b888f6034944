/// Account management system
///
/// Email/password accounts, JWT sessions and re-authenticated password
/// changes. Every account has exactly one social profile, created with it.

mod manager;
pub mod password;

pub use manager::AccountManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Stored account, without its password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Issued token pair
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub uid: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Validated session from bearer token
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSession {
    pub uid: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 3, max = 20, message = "Username must be 3 to 20 characters"))]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSessionRequest {
    #[validate(length(min = 1))]
    pub refresh_jwt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

/// Tokens handed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub uid: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            uid: session.uid,
            access_jwt: session.access_token,
            refresh_jwt: session.refresh_token,
            expires_at: session.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_request_validation() {
        let ok = SignupRequest {
            email: "a@example.com".to_string(),
            password: "secret1".to_string(),
            username: "alice".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = SignupRequest {
            email: "nope".to_string(),
            password: "123".to_string(),
            username: "al".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("username"));
    }
}
