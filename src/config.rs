/// Configuration management for the Aura server
use crate::error::{AuraError, AuraResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub authentication: AuthConfig,
    pub media: MediaConfig,
    pub feed: FeedConfig,
    pub stories: StoryConfig,
    pub push: PushConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL used when handing out media URLs
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub media_directory: PathBuf,
}

/// Connection pool and transaction retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub transaction_max_attempts: u32,
    pub transaction_backoff_ms: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
}

/// Upload limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub upload_limit: usize,
    pub avatar_upload_limit: usize,
}

/// Home feed assembly limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum ids in a single `IN (...)` query
    pub in_list_cap: usize,
    pub per_chunk_limit: u32,
    pub display_limit: usize,
}

/// Story settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryConfig {
    pub ttl_hours: i64,
    /// Number of author ids considered for the story bar
    pub author_cap: usize,
}

/// Push gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushConfig {
    /// Log composed notifications instead of delivering them
    Log,
    /// FCM HTTP v1, authorized with a Google service-account key file
    Fcm {
        endpoint: String,
        /// Falls back to the key file's project_id when empty
        project_id: String,
        credentials_file: PathBuf,
    },
}

impl PushConfig {
    pub fn name(&self) -> &'static str {
        match self {
            PushConfig::Log => "log",
            PushConfig::Fcm { .. } => "fcm",
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Default configuration rooted at `data_directory`
    pub fn new(data_directory: PathBuf, jwt_secret: String) -> Self {
        let hostname = "localhost".to_string();
        let port = 8080;

        ServerConfig {
            service: ServiceConfig {
                public_url: format!("http://{}:{}", hostname, port),
                hostname,
                port,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            storage: StorageConfig {
                database: data_directory.join("aura.sqlite"),
                media_directory: data_directory.join("media"),
                data_directory,
            },
            database: DatabaseConfig {
                max_connections: 10,
                transaction_max_attempts: 10,
                transaction_backoff_ms: 5,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl_secs: 3600,
                refresh_token_ttl_days: 30,
            },
            media: MediaConfig {
                upload_limit: 5 * 1024 * 1024,
                avatar_upload_limit: 2 * 1024 * 1024,
            },
            feed: FeedConfig {
                in_list_cap: 30,
                per_chunk_limit: 20,
                display_limit: 50,
            },
            stories: StoryConfig {
                ttl_hours: 24,
                author_cap: 10,
            },
            push: PushConfig::Log,
            rate_limit: RateLimitConfig {
                enabled: true,
                authenticated_rps: 100,
                unauthenticated_rps: 10,
                burst_size: 50,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> AuraResult<Self> {
        dotenv::dotenv().ok();

        let data_directory: PathBuf = env::var("AURA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let jwt_secret = env::var("AURA_JWT_SECRET")
            .map_err(|_| AuraError::Validation("JWT secret required".to_string()))?;

        let mut config = Self::new(data_directory, jwt_secret);

        config.service.hostname =
            env::var("AURA_HOSTNAME").unwrap_or_else(|_| config.service.hostname.clone());
        config.service.port = env::var("AURA_PORT")
            .unwrap_or_else(|_| config.service.port.to_string())
            .parse()
            .map_err(|_| AuraError::Validation("Invalid port number".to_string()))?;
        config.service.public_url = env::var("AURA_PUBLIC_URL").unwrap_or_else(|_| {
            format!("http://{}:{}", config.service.hostname, config.service.port)
        });

        if let Ok(path) = env::var("AURA_DATABASE_LOCATION") {
            config.storage.database = PathBuf::from(path);
        }
        if let Ok(path) = env::var("AURA_MEDIA_DIRECTORY") {
            config.storage.media_directory = PathBuf::from(path);
        }

        config.database.max_connections = env::var("AURA_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        config.database.transaction_max_attempts = env::var("AURA_TX_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        config.authentication.access_token_ttl_secs = env::var("AURA_ACCESS_TOKEN_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);
        config.authentication.refresh_token_ttl_days = env::var("AURA_REFRESH_TOKEN_TTL_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        config.media.upload_limit = env::var("AURA_UPLOAD_LIMIT")
            .unwrap_or_else(|_| "5242880".to_string())
            .parse()
            .unwrap_or(5242880);
        config.media.avatar_upload_limit = env::var("AURA_AVATAR_UPLOAD_LIMIT")
            .unwrap_or_else(|_| "2097152".to_string())
            .parse()
            .unwrap_or(2097152);

        config.feed.display_limit = env::var("AURA_FEED_DISPLAY_LIMIT")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        config.stories.ttl_hours = env::var("AURA_STORY_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse()
            .unwrap_or(24);

        config.push = match env::var("AURA_PUSH_GATEWAY").as_deref() {
            Ok("fcm") => PushConfig::Fcm {
                endpoint: env::var("AURA_FCM_ENDPOINT")
                    .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
                project_id: env::var("AURA_FCM_PROJECT_ID").unwrap_or_default(),
                credentials_file: env::var("AURA_FCM_CREDENTIALS")
                    .map(PathBuf::from)
                    .map_err(|_| {
                        AuraError::Validation("FCM service account key file required".to_string())
                    })?,
            },
            _ => PushConfig::Log,
        };

        config.rate_limit.enabled = env::var("AURA_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        config.rate_limit.authenticated_rps = env::var("AURA_RATE_LIMIT_AUTHENTICATED_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        config.rate_limit.unauthenticated_rps = env::var("AURA_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        config.logging.level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> AuraResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AuraError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AuraError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.feed.in_list_cap == 0 || self.feed.in_list_cap > 30 {
            return Err(AuraError::Validation(
                "Feed in-list cap must be between 1 and 30".to_string(),
            ));
        }

        if self.database.transaction_max_attempts == 0 {
            return Err(AuraError::Validation(
                "Transactions need at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::new(
            PathBuf::from("./data"),
            "0123456789abcdef0123456789abcdef".to_string(),
        );

        assert!(config.validate().is_ok());
        assert_eq!(config.feed.in_list_cap, 30);
        assert_eq!(config.feed.per_chunk_limit, 20);
        assert_eq!(config.feed.display_limit, 50);
        assert_eq!(config.stories.ttl_hours, 24);
        assert_eq!(config.media.upload_limit, 5 * 1024 * 1024);
        assert_eq!(config.storage.database, PathBuf::from("./data/aura.sqlite"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = ServerConfig::new(PathBuf::from("./data"), "short".to_string());
        assert!(matches!(config.validate(), Err(AuraError::Validation(_))));
    }

    #[test]
    fn test_in_list_cap_bounded() {
        let mut config = ServerConfig::new(
            PathBuf::from("./data"),
            "0123456789abcdef0123456789abcdef".to_string(),
        );
        config.feed.in_list_cap = 31;
        assert!(config.validate().is_err());
    }
}
