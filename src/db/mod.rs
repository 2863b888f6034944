/// Database layer for the Aura server
///
/// Manages the SQLite connection pool, embedded migrations, and the
/// transaction runner that every multi-record write goes through.

use crate::error::{AuraError, AuraResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite primary result codes that mean "another writer got there first"
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> AuraResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Create a private in-memory database with migrations applied
///
/// Uses a single connection that never expires, since every new SQLite
/// memory connection would otherwise open an empty database.
pub async fn create_memory_pool() -> AuraResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> AuraResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> AuraResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Current time as stored in the database (epoch milliseconds)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a stored timestamp back to a `DateTime`
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// How often a contended transaction is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff with up to one extra step of random jitter
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64;
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base)
        } else {
            0
        };
        Duration::from_millis(base * attempt as u64 + jitter)
    }
}

/// Whether a database error is a transient write conflict worth retrying
pub fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

fn is_contention_error(err: &AuraError) -> bool {
    matches!(err, AuraError::Database(e) if is_contention(e))
}

/// Run `body` inside a transaction, retrying on write contention
///
/// The closure may run several times. It must derive everything it writes
/// from what it reads through the connection it is given, so a retried
/// attempt never applies a change twice. Any other error rolls back and is
/// returned as is.
pub async fn transact<T, F>(
    pool: &SqlitePool,
    policy: &RetryPolicy,
    operation: &'static str,
    mut body: F,
) -> AuraResult<T>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, AuraResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match pool.begin().await {
            Ok(mut tx) => match body(&mut *tx).await {
                Ok(value) => tx.commit().await.map(|_| value).map_err(AuraError::from),
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(operation, "Rollback failed: {}", rollback_err);
                    }
                    Err(e)
                }
            },
            Err(e) => Err(AuraError::from(e)),
        };

        match outcome {
            Ok(value) => {
                metrics::record_transaction(operation, "committed");
                return Ok(value);
            }
            Err(e) if is_contention_error(&e) => {
                if attempt >= policy.max_attempts {
                    metrics::record_transaction(operation, "exhausted");
                    tracing::warn!(operation, attempt, "Transaction retries exhausted");
                    return Err(AuraError::Contention(format!(
                        "{} gave up after {} attempts",
                        operation, attempt
                    )));
                }

                metrics::record_transaction_retry(operation);
                tracing::debug!(operation, attempt, "Write contention, retrying transaction");
                tokio::time::sleep(policy.delay(attempt)).await;
            }
            Err(e) => {
                metrics::record_transaction(operation, "aborted");
                return Err(e);
            }
        }
    }
}
