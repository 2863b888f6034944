/// FCM gateway over the HTTP v1 API
///
/// Requests are authorized with a short-lived OAuth2 access token. The token
/// is obtained by signing an RS256 assertion with the service account's
/// private key and exchanging it at the account's token endpoint. It is
/// cached until shortly before it expires.
use super::{PushGateway, PushMessage};
use crate::error::{AuraError, AuraResult};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::sync::Mutex;

pub const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const ASSERTION_TTL_SECS: i64 = 3600;
/// A cached token is refreshed once it has less than this left
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file that signing needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> AuraResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AuraError::Push(format!("Invalid service account key: {}", e)))
    }

    pub fn from_file(path: &Path) -> AuraResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuraError::Push(format!("Failed to read service account key {:?}: {}", path, e))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Unix seconds
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - now > REFRESH_MARGIN_SECS
    }
}

pub struct FcmPushGateway {
    send_url: String,
    credentials: ServiceAccountKey,
    token_cache: Mutex<Option<CachedToken>>,
    http_client: Client,
}

impl FcmPushGateway {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        credentials: ServiceAccountKey,
    ) -> AuraResult<Self> {
        let project_id = Some(project_id)
            .filter(|id| !id.is_empty())
            .or(credentials.project_id.as_deref())
            .ok_or_else(|| AuraError::Push("FCM project id is empty".to_string()))?
            .to_string();

        if credentials.client_email.is_empty() || credentials.private_key.is_empty() {
            return Err(AuraError::Push(
                "Service account key needs client_email and private_key".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuraError::Push(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                endpoint.trim_end_matches('/'),
                project_id
            ),
            credentials,
            token_cache: Mutex::new(None),
            http_client,
        })
    }

    /// Signed JWT to trade for an access token
    fn assertion(&self, now: i64) -> AuraResult<String> {
        let claims = AssertionClaims {
            iss: &self.credentials.client_email,
            sub: &self.credentials.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.credentials.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| AuraError::Push(format!("Invalid service account private key: {}", e)))?;

        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| AuraError::Push(format!("Failed to sign token assertion: {}", e)))
    }

    async fn access_token(&self) -> AuraResult<String> {
        // Held across the exchange so concurrent sends share one refresh
        let mut cache = self.token_cache.lock().await;

        let now = Utc::now().timestamp();
        if let Some(cached) = cache.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(cached.access_token.clone());
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuraError::Push(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuraError::Push(format!(
                "Token request returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuraError::Push(format!("Invalid token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed FCM access token");

        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now().timestamp() + token.expires_in,
        });
        Ok(token.access_token)
    }

    fn payload(token: &str, message: &PushMessage) -> serde_json::Value {
        serde_json::json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "webpush": {
                    "notification": {
                        "icon": message.icon,
                    },
                    "fcm_options": {
                        "link": message.click_action,
                    },
                },
            }
        })
    }
}

#[async_trait]
impl PushGateway for FcmPushGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> AuraResult<()> {
        let access_token = self.access_token().await?;

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&Self::payload(token, message))
            .send()
            .await
            .map_err(|e| AuraError::Push(format!("FCM request failed: {}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(AuraError::Push(format!("FCM returned {}: {}", status, error_text)))
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::NotificationKind;

    fn credentials() -> ServiceAccountKey {
        ServiceAccountKey::from_json(
            r#"{
                "type": "service_account",
                "project_id": "aura-test",
                "private_key_id": "abc",
                "private_key": "not a pem key",
                "client_email": "push@aura-test.iam.gserviceaccount.com"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_payload_shape() {
        let message = super::super::compose(NotificationKind::Comment, "carol");
        let payload = FcmPushGateway::payload("tok", &message);

        let body = &payload["message"];
        assert_eq!(body["token"], "tok");
        assert_eq!(body["notification"]["title"], "New Comment!");
        assert_eq!(body["notification"]["body"], "carol commented on your post.");
        assert_eq!(body["webpush"]["notification"]["icon"], "/favicon.ico");
        assert_eq!(body["webpush"]["fcm_options"]["link"], "/");
        assert!(payload.get("to").is_none());
    }

    #[test]
    fn test_send_url_uses_project() {
        let gateway = FcmPushGateway::new(DEFAULT_FCM_ENDPOINT, "", credentials()).unwrap();
        assert_eq!(
            gateway.send_url,
            "https://fcm.googleapis.com/v1/projects/aura-test/messages:send"
        );

        let gateway =
            FcmPushGateway::new("http://localhost:9099/", "other", credentials()).unwrap();
        assert_eq!(
            gateway.send_url,
            "http://localhost:9099/v1/projects/other/messages:send"
        );
    }

    #[test]
    fn test_key_file_defaults_token_uri() {
        let key = credentials();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(!format!("{:?}", key).contains("not a pem key"));
    }

    #[test]
    fn test_missing_project_or_key_rejected() {
        let mut key = credentials();
        key.project_id = None;
        assert!(matches!(
            FcmPushGateway::new(DEFAULT_FCM_ENDPOINT, "", key),
            Err(AuraError::Push(_))
        ));

        let mut key = credentials();
        key.private_key.clear();
        assert!(matches!(
            FcmPushGateway::new(DEFAULT_FCM_ENDPOINT, "aura-test", key),
            Err(AuraError::Push(_))
        ));

        assert!(ServiceAccountKey::from_json("{}").is_err());
    }

    #[test]
    fn test_bad_private_key_fails_signing() {
        let gateway = FcmPushGateway::new(DEFAULT_FCM_ENDPOINT, "", credentials()).unwrap();
        assert!(matches!(
            gateway.assertion(Utc::now().timestamp()),
            Err(AuraError::Push(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_cached_token_is_reused() {
        let gateway = FcmPushGateway::new(DEFAULT_FCM_ENDPOINT, "", credentials()).unwrap();
        let now = Utc::now().timestamp();
        *gateway.token_cache.lock().await = Some(CachedToken {
            access_token: "cached".to_string(),
            expires_at: now + 600,
        });

        // A fresh token never reaches signing, which would fail on this key
        assert_eq!(gateway.access_token().await.unwrap(), "cached");

        *gateway.token_cache.lock().await = Some(CachedToken {
            access_token: "stale".to_string(),
            expires_at: now + 10,
        });
        assert!(matches!(
            gateway.access_token().await,
            Err(AuraError::Push(_))
        ));
    }
}
