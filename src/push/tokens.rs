/// Device token registry, one token per user
use crate::{db::now_millis, error::AuraResult};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct PushTokenStore {
    db: SqlitePool,
}

impl PushTokenStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Store `token` for `uid`; the latest registration wins
    pub async fn register(&self, uid: &str, token: &str) -> AuraResult<()> {
        sqlx::query(
            "INSERT INTO push_token (uid, token, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (uid) DO UPDATE SET token = excluded.token, updated_at = excluded.updated_at",
        )
        .bind(uid)
        .bind(token)
        .bind(now_millis())
        .execute(&self.db)
        .await?;

        tracing::debug!(uid, "Registered push token");
        Ok(())
    }

    pub async fn get(&self, uid: &str) -> AuraResult<Option<String>> {
        let token = sqlx::query_scalar("SELECT token FROM push_token WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.db)
            .await?;
        Ok(token)
    }

    pub async fn remove(&self, uid: &str) -> AuraResult<bool> {
        let removed = sqlx::query("DELETE FROM push_token WHERE uid = ?1")
            .bind(uid)
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}
