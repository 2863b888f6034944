/// Account manager implementation using runtime queries
use crate::{
    account::{password, Account, Session, ValidatedSession},
    config::ServerConfig,
    db::{millis_to_datetime, now_millis, transact, RetryPolicy},
    error::{AuraError, AuraResult},
    social::{
        profiles::{insert_profile, NewProfile},
        Profile,
    },
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

const ACCESS_TOKEN: &str = "access";
const REFRESH_TOKEN: &str = "refresh";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    sid: String,
    typ: String,
    iat: i64,
    exp: i64,
}

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    retry: RetryPolicy,
}

impl AccountManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, retry: RetryPolicy) -> Self {
        Self { db, config, retry }
    }

    fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn validate_email(email: &str) -> AuraResult<()> {
        if !email.contains('@') {
            return Err(AuraError::Validation("Invalid email address".to_string()));
        }
        Ok(())
    }

    /// Usernames are 3 to 20 characters of letters, digits, `_` and `.`
    pub fn validate_username(username: &str) -> AuraResult<()> {
        let len = username.chars().count();
        if !(3..=20).contains(&len) {
            return Err(AuraError::Validation(
                "Username must be 3 to 20 characters".to_string(),
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(AuraError::Validation(
                "Username may only contain letters, numbers, '_' and '.'".to_string(),
            ));
        }
        Ok(())
    }

    /// Create an account and its profile in one transaction
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> AuraResult<(Account, Profile)> {
        let email = Self::normalize_email(email);
        let username = username.trim().to_string();

        Self::validate_email(&email)?;
        password::validate_password(password)?;
        Self::validate_username(&username)?;

        let password_hash = password::hash_password(password)?;
        let uid = Uuid::new_v4().to_string();

        let (account, profile) = transact(&self.db, &self.retry, "create_account", |conn| {
            let uid = uid.clone();
            let email = email.clone();
            let username = username.clone();
            let password_hash = password_hash.clone();
            Box::pin(async move {
                let existing: Option<String> =
                    sqlx::query_scalar("SELECT uid FROM account WHERE email = ?1")
                        .bind(&email)
                        .fetch_optional(&mut *conn)
                        .await?;
                if existing.is_some() {
                    return Err(AuraError::Conflict("Email already registered".to_string()));
                }

                let now = now_millis();
                sqlx::query(
                    "INSERT INTO account (uid, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(&uid)
                .bind(&email)
                .bind(&password_hash)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                let profile = insert_profile(
                    conn,
                    &NewProfile {
                        uid: uid.clone(),
                        email: email.clone(),
                        username,
                    },
                )
                .await?;

                let account = Account {
                    uid,
                    email,
                    created_at: millis_to_datetime(now),
                };
                Ok((account, profile))
            })
        })
        .await?;

        tracing::info!(uid = %account.uid, username = %profile.username, "Account created");
        Ok((account, profile))
    }

    /// Authenticate by email and password and open a session
    pub async fn login(&self, email: &str, password: &str) -> AuraResult<(Account, Session)> {
        let email = Self::normalize_email(email);

        let row = sqlx::query("SELECT uid, email, password_hash, created_at FROM account WHERE email = ?1")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::Authentication("Invalid credentials".to_string()))?;

        let password_hash: String = row.get("password_hash");
        if !password::verify_password(password, &password_hash)? {
            return Err(AuraError::Authentication("Invalid credentials".to_string()));
        }

        let account = Account {
            uid: row.get("uid"),
            email: row.get("email"),
            created_at: millis_to_datetime(row.get("created_at")),
        };
        let session = self.create_session(&account.uid).await?;

        tracing::info!(uid = %account.uid, "Login");
        Ok((account, session))
    }

    pub async fn get_account(&self, uid: &str) -> AuraResult<Account> {
        let row = sqlx::query("SELECT uid, email, created_at FROM account WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::NotFound("Account not found".to_string()))?;

        Ok(Account {
            uid: row.get("uid"),
            email: row.get("email"),
            created_at: millis_to_datetime(row.get("created_at")),
        })
    }

    /// Issue a fresh access/refresh token pair
    pub async fn create_session(&self, uid: &str) -> AuraResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let auth = &self.config.authentication;

        let now = Utc::now();
        let expires_at = now + Duration::seconds(auth.access_token_ttl_secs);
        let refresh_expires_at = now + Duration::days(auth.refresh_token_ttl_days);

        let access_token = self.generate_token(uid, &session_id, ACCESS_TOKEN, expires_at.timestamp())?;
        let refresh_token =
            self.generate_token(uid, &session_id, REFRESH_TOKEN, refresh_expires_at.timestamp())?;

        sqlx::query(
            "INSERT INTO session (id, uid, access_token, refresh_token, created_at, expires_at, refresh_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&session_id)
        .bind(uid)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(now.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .bind(refresh_expires_at.timestamp_millis())
        .execute(&self.db)
        .await?;

        Ok(Session {
            id: session_id,
            uid: uid.to_string(),
            access_token,
            refresh_token,
            created_at: millis_to_datetime(now.timestamp_millis()),
            expires_at: millis_to_datetime(expires_at.timestamp_millis()),
            refresh_expires_at: millis_to_datetime(refresh_expires_at.timestamp_millis()),
        })
    }

    /// Validate access token and return session info
    pub async fn validate_access_token(&self, token: &str) -> AuraResult<ValidatedSession> {
        let claims = self.decode_token(token, ACCESS_TOKEN)?;

        let row = sqlx::query("SELECT id, uid, expires_at FROM session WHERE access_token = ?1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::Authentication("Invalid or expired session".to_string()))?;

        let expires_at: i64 = row.get("expires_at");
        if now_millis() > expires_at {
            return Err(AuraError::Authentication("Session expired".to_string()));
        }

        let session_id: String = row.get("id");
        if session_id != claims.sid {
            return Err(AuraError::Authentication("Invalid or expired session".to_string()));
        }

        Ok(ValidatedSession {
            uid: row.get("uid"),
            session_id,
        })
    }

    /// Exchange a refresh token for a new session; the old one is deleted
    pub async fn refresh_session(&self, refresh_token: &str) -> AuraResult<Session> {
        self.decode_token(refresh_token, REFRESH_TOKEN)?;

        let row = sqlx::query("SELECT id, uid, refresh_expires_at FROM session WHERE refresh_token = ?1")
            .bind(refresh_token)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::Authentication("Invalid refresh token".to_string()))?;

        let session_id: String = row.get("id");
        let uid: String = row.get("uid");
        let refresh_expires_at: i64 = row.get("refresh_expires_at");

        if now_millis() > refresh_expires_at {
            return Err(AuraError::Authentication("Refresh token expired".to_string()));
        }

        // Only one concurrent refresh can consume the old session
        let deleted = sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(&session_id)
            .execute(&self.db)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AuraError::Authentication("Refresh token already used".to_string()));
        }

        self.create_session(&uid).await
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> AuraResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Change the password after re-authenticating with the current one
    ///
    /// Every session except `keep_session` is revoked. Returns how many.
    pub async fn change_password(
        &self,
        uid: &str,
        keep_session: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuraResult<u64> {
        let password_hash: String =
            sqlx::query_scalar("SELECT password_hash FROM account WHERE uid = ?1")
                .bind(uid)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AuraError::NotFound("Account not found".to_string()))?;

        if !password::verify_password(current_password, &password_hash)? {
            return Err(AuraError::Authentication(
                "Current password is incorrect".to_string(),
            ));
        }
        password::validate_password(new_password)?;

        let new_hash = password::hash_password(new_password)?;

        let revoked = transact(&self.db, &self.retry, "change_password", |conn| {
            let uid = uid.to_string();
            let keep_session = keep_session.to_string();
            let new_hash = new_hash.clone();
            Box::pin(async move {
                sqlx::query("UPDATE account SET password_hash = ?1 WHERE uid = ?2")
                    .bind(&new_hash)
                    .bind(&uid)
                    .execute(&mut *conn)
                    .await?;

                let revoked = sqlx::query("DELETE FROM session WHERE uid = ?1 AND id != ?2")
                    .bind(&uid)
                    .bind(&keep_session)
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                Ok(revoked)
            })
        })
        .await?;

        tracing::info!(uid, revoked, "Password changed");
        Ok(revoked)
    }

    /// Remove sessions whose refresh token has expired
    pub async fn cleanup_expired_sessions(&self) -> AuraResult<u64> {
        let deleted = sqlx::query("DELETE FROM session WHERE refresh_expires_at < ?1")
            .bind(now_millis())
            .execute(&self.db)
            .await?
            .rows_affected();

        if deleted > 0 {
            tracing::info!(sessions_deleted = deleted, "Cleaned up expired sessions");
        } else {
            tracing::debug!("Session cleanup: no expired sessions found");
        }

        Ok(deleted)
    }

    fn generate_token(&self, uid: &str, session_id: &str, typ: &str, exp: i64) -> AuraResult<String> {
        let claims = Claims {
            sub: uid.to_string(),
            sid: session_id.to_string(),
            typ: typ.to_string(),
            iat: Utc::now().timestamp(),
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuraError::Jwt(format!("Failed to generate token: {}", e)))
    }

    fn decode_token(&self, token: &str, typ: &str) -> AuraResult<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AuraError::Authentication(format!("Invalid token: {}", e)))?;

        if data.claims.typ != typ {
            return Err(AuraError::Authentication("Wrong token type".to_string()));
        }
        Ok(data.claims)
    }
}
