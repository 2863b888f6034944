/// Application context and dependency injection
use crate::{
    account::AccountManager,
    blob_store::BlobStore,
    config::ServerConfig,
    db::{self, RetryPolicy},
    error::{AuraError, AuraResult},
    live::ChangeBus,
    push::{self, PushDispatcher, PushGateway, PushTokenStore},
    rate_limit::RateLimiter,
    social::{EventSink, SocialLimits, SocialStore},
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub social: SocialStore,
    pub blob_store: Arc<BlobStore>,
    pub push_tokens: PushTokenStore,
    pub change_bus: ChangeBus,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuraResult<Self> {
        let gateway = push::gateway_from_config(&config.push)?;
        Self::with_gateway(config, gateway).await
    }

    /// Create a context that delivers pushes through `gateway`
    ///
    /// Spawns the push trigger worker, so this must run inside a Tokio runtime.
    pub async fn with_gateway(config: ServerConfig, gateway: Arc<dyn PushGateway>) -> AuraResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.database.max_connections,
                enable_wal: true,
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let retry = RetryPolicy {
            max_attempts: config.database.transaction_max_attempts,
            backoff: Duration::from_millis(config.database.transaction_backoff_ms),
        };
        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone(), retry.clone()));

        let change_bus = ChangeBus::default();
        let push_tokens = PushTokenStore::new(db.clone());
        let (outbox, inbox) = push::notification_channel();
        push::spawn_trigger(
            PushDispatcher::new(db.clone(), push_tokens.clone(), gateway.clone()),
            inbox,
        );
        tracing::info!(gateway = gateway.name(), "Push gateway configured");

        let social = SocialStore::new(
            db.clone(),
            retry,
            SocialLimits::from_config(&config),
            EventSink::new(change_bus.clone(), Some(outbox)),
        );

        let blob_store = Arc::new(BlobStore::on_disk(
            config.storage.media_directory.clone(),
            &config.service.public_url,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config,
            db,
            account_manager,
            social,
            blob_store,
            push_tokens,
            change_bus,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AuraResult<()> {
        for dir in [&config.storage.data_directory, &config.storage.media_directory] {
            if !dir.exists() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    AuraError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
                })?;
            }
        }

        Ok(())
    }

    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
