/// Notifications
///
/// Notifications are append-only. They are created inside the transaction
/// of the action they describe, and the only later mutation is flipping
/// `read` from false to true.
use super::{ChangeSet, NewNotification, Notification, NotificationView, SocialStore};
use crate::{
    db::{millis_to_datetime, now_millis},
    error::AuraResult,
    live::Topic,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

/// Write a notification as part of an enclosing transaction
pub async fn insert_notification(
    conn: &mut SqliteConnection,
    new: NewNotification,
) -> AuraResult<Notification> {
    let id = Uuid::new_v4().to_string();
    let now = now_millis();

    sqlx::query(
        "INSERT INTO notification (id, recipient_id, sender_id, kind, post_id, chat_id, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
    )
    .bind(&id)
    .bind(&new.recipient_id)
    .bind(&new.sender_id)
    .bind(new.kind.as_str())
    .bind(&new.post_id)
    .bind(&new.chat_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Notification {
        id,
        recipient_id: new.recipient_id,
        sender_id: new.sender_id,
        kind: new.kind,
        post_id: new.post_id,
        chat_id: new.chat_id,
        read: false,
        created_at: millis_to_datetime(now),
    })
}

impl SocialStore {
    /// Most recent notifications for `uid`, newest first, with senders
    ///
    /// Notifications whose sender no longer exists are left out.
    pub async fn list_notifications(&self, uid: &str) -> AuraResult<Vec<NotificationView>> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notification WHERE recipient_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(uid)
        .bind(self.limits.notifications)
        .fetch_all(&self.db)
        .await?;

        let sender_ids: Vec<String> = notifications.iter().map(|n| n.sender_id.clone()).collect();
        let senders = self.get_profiles(&sender_ids).await?;

        Ok(notifications
            .into_iter()
            .filter_map(|notification| {
                let sender = senders.get(&notification.sender_id)?.clone();
                Some(NotificationView {
                    notification,
                    sender,
                })
            })
            .collect())
    }

    pub async fn unread_notification_count(&self, uid: &str) -> AuraResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE recipient_id = ?1 AND read = 0",
        )
        .bind(uid)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }

    /// Mark the caller's own unread notifications as read
    ///
    /// `ids = None` marks all of them. Returns how many changed.
    pub async fn mark_notifications_read(&self, uid: &str, ids: Option<&[String]>) -> AuraResult<u64> {
        let updated = match ids {
            None => sqlx::query(
                "UPDATE notification SET read = 1 WHERE recipient_id = ?1 AND read = 0",
            )
            .bind(uid)
            .execute(&self.db)
            .await?
            .rows_affected(),
            Some(ids) => {
                let mut total = 0;
                for chunk in ids.chunks(self.limits.in_list_cap) {
                    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                        "UPDATE notification SET read = 1 WHERE read = 0 AND recipient_id = ",
                    );
                    query.push_bind(uid);
                    query.push(" AND id IN (");
                    let mut separated = query.separated(", ");
                    for id in chunk {
                        separated.push_bind(id);
                    }
                    separated.push_unseparated(")");
                    total += query.build().execute(&self.db).await?.rows_affected();
                }
                total
            }
        };

        if updated > 0 {
            let mut changes = ChangeSet::default();
            changes.touch(Topic::Notifications(uid.to_string()));
            self.events.emit(changes);
        }

        Ok(updated)
    }
}
