/// Follow graph
///
/// A follow is two mirrored existence records, `following(actor, target)`
/// and `followers(target, actor)`, plus a counter on each profile. All four
/// change together in one transaction or not at all.
use super::{
    counters::{self, Counter},
    notifications::insert_notification,
    ChangeSet, NewNotification, NotificationKind, RelationshipChange, SocialStore,
};
use crate::{
    db::{now_millis, transact},
    error::{AuraError, AuraResult},
    live::Topic,
};
use sqlx::SqliteConnection;

async fn edge_exists(conn: &mut SqliteConnection, actor: &str, target: &str) -> AuraResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM following WHERE uid = ?1 AND target_uid = ?2")
            .bind(actor)
            .bind(target)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

/// Bring the edge `actor -> target` to `desired` (or flip it when `None`)
async fn apply_follow(
    conn: &mut SqliteConnection,
    actor: &str,
    target: &str,
    desired: Option<bool>,
) -> AuraResult<(RelationshipChange, ChangeSet)> {
    let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profile WHERE uid IN (?1, ?2)")
        .bind(actor)
        .bind(target)
        .fetch_one(&mut *conn)
        .await?;
    if present < 2 {
        return Err(AuraError::NotFound("User not found".to_string()));
    }

    let current = edge_exists(conn, actor, target).await?;
    let want = desired.unwrap_or(!current);
    let mut changes = ChangeSet::default();

    if want == current {
        return Ok((
            RelationshipChange {
                active: current,
                changed: false,
            },
            changes,
        ));
    }

    let delta = if want {
        let now = now_millis();
        sqlx::query("INSERT INTO following (uid, target_uid, created_at) VALUES (?1, ?2, ?3)")
            .bind(actor)
            .bind(target)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO followers (uid, follower_uid, created_at) VALUES (?1, ?2, ?3)")
            .bind(target)
            .bind(actor)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        1
    } else {
        sqlx::query("DELETE FROM following WHERE uid = ?1 AND target_uid = ?2")
            .bind(actor)
            .bind(target)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM followers WHERE uid = ?1 AND follower_uid = ?2")
            .bind(target)
            .bind(actor)
            .execute(&mut *conn)
            .await?;
        -1
    };

    counters::apply_delta(conn, &Counter::Following(actor.to_string()), delta).await?;
    counters::apply_delta(conn, &Counter::Followers(target.to_string()), delta).await?;

    if want {
        let notification = insert_notification(
            conn,
            NewNotification {
                recipient_id: target.to_string(),
                sender_id: actor.to_string(),
                kind: NotificationKind::Follow,
                post_id: None,
                chat_id: None,
            },
        )
        .await?;
        changes.notify(notification);
    }

    changes.touch(Topic::Following(actor.to_string()));
    changes.touch(Topic::Profile(actor.to_string()));
    changes.touch(Topic::Profile(target.to_string()));

    Ok((
        RelationshipChange {
            active: want,
            changed: true,
        },
        changes,
    ))
}

impl SocialStore {
    /// Whether `actor` follows `target`
    pub async fn is_following(&self, actor: &str, target: &str) -> AuraResult<bool> {
        let mut conn = self.db.acquire().await?;
        edge_exists(&mut conn, actor, target).await
    }

    /// Uids `uid` follows, most recent first
    pub async fn following_ids(&self, uid: &str) -> AuraResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT target_uid FROM following WHERE uid = ?1 ORDER BY created_at DESC, target_uid",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Set whether `actor` follows `target`
    ///
    /// Idempotent: asking for the current state changes nothing and creates
    /// no notification.
    pub async fn set_following(
        &self,
        actor: &str,
        target: &str,
        desired: bool,
    ) -> AuraResult<RelationshipChange> {
        self.write_follow(actor, target, Some(desired)).await
    }

    /// Flip whether `actor` follows `target`, based on the state read inside
    /// the transaction
    pub async fn toggle_following(&self, actor: &str, target: &str) -> AuraResult<RelationshipChange> {
        self.write_follow(actor, target, None).await
    }

    async fn write_follow(
        &self,
        actor: &str,
        target: &str,
        desired: Option<bool>,
    ) -> AuraResult<RelationshipChange> {
        if actor == target {
            return Err(AuraError::Validation("You cannot follow yourself".to_string()));
        }

        let actor_owned = actor.to_string();
        let target_owned = target.to_string();
        let (change, changes) = transact(&self.db, &self.retry, "follow", |conn| {
            let actor = actor_owned.clone();
            let target = target_owned.clone();
            Box::pin(async move { apply_follow(conn, &actor, &target, desired).await })
        })
        .await?;

        if change.changed {
            tracing::info!(actor, target, following = change.active, "Follow state changed");
        }
        self.events.emit(changes);

        Ok(change)
    }

    /// Recompute both follow counters of a user from the edge records
    pub async fn repair_follow_counters(&self, uid: &str) -> AuraResult<()> {
        let uid_owned = uid.to_string();
        transact(&self.db, &self.retry, "repair_follow_counters", |conn| {
            let uid = uid_owned.clone();
            Box::pin(async move {
                counters::recount(conn, &Counter::Followers(uid.clone())).await?;
                counters::recount(conn, &Counter::Following(uid)).await?;
                Ok(())
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::testing;

    async fn edge_counts(store: &SocialStore, actor: &str, target: &str) -> (i64, i64) {
        let following: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM following WHERE uid = ?1 AND target_uid = ?2",
        )
        .bind(actor)
        .bind(target)
        .fetch_one(store.db())
        .await
        .unwrap();
        let followers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM followers WHERE uid = ?1 AND follower_uid = ?2",
        )
        .bind(target)
        .bind(actor)
        .fetch_one(store.db())
        .await
        .unwrap();
        (following, followers)
    }

    #[tokio::test]
    async fn test_follow_then_unfollow() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();

        let change = store.set_following("alice", "bob", true).await.unwrap();
        assert_eq!(change, RelationshipChange { active: true, changed: true });
        assert!(store.is_following("alice", "bob").await.unwrap());
        assert_eq!(edge_counts(&store, "alice", "bob").await, (1, 1));
        assert_eq!(store.get_profile("alice").await.unwrap().following_count, 1);
        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 1);

        let notifications = store.list_notifications("bob").await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification.kind, NotificationKind::Follow);
        assert_eq!(notifications[0].sender.uid, "alice");

        let change = store.set_following("alice", "bob", false).await.unwrap();
        assert_eq!(change, RelationshipChange { active: false, changed: true });
        assert_eq!(edge_counts(&store, "alice", "bob").await, (0, 0));
        assert_eq!(store.get_profile("alice").await.unwrap().following_count, 0);
        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 0);
    }

    #[tokio::test]
    async fn test_set_following_is_idempotent() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();

        store.set_following("alice", "bob", true).await.unwrap();
        let again = store.set_following("alice", "bob", true).await.unwrap();
        assert_eq!(again, RelationshipChange { active: true, changed: false });

        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 1);
        assert_eq!(store.list_notifications("bob").await.unwrap().len(), 1);

        let unfollow = store.set_following("alice", "bob", false).await.unwrap();
        assert!(unfollow.changed);
        let unfollow_again = store.set_following("alice", "bob", false).await.unwrap();
        assert!(!unfollow_again.changed);
        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 0);
    }

    #[tokio::test]
    async fn test_toggle_following() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();

        assert!(store.toggle_following("alice", "bob").await.unwrap().active);
        assert!(!store.toggle_following("alice", "bob").await.unwrap().active);
        assert!(store.toggle_following("alice", "bob").await.unwrap().active);
        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 1);
    }

    #[tokio::test]
    async fn test_follow_missing_user() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        match store.set_following("alice", "ghost", true).await.unwrap_err() {
            AuraError::NotFound(_) => {}
            other => panic!("Expected NotFound, got {:?}", other),
        }
        assert_eq!(store.get_profile("alice").await.unwrap().following_count, 0);
    }

    #[tokio::test]
    async fn test_cannot_follow_self() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        assert!(matches!(
            store.set_following("alice", "alice", true).await,
            Err(AuraError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_following_ids_and_lists() {
        let store = testing::store().await;
        for uid in ["alice", "bob", "carol"] {
            testing::add_user(&store, uid).await.unwrap();
        }
        store.set_following("alice", "bob", true).await.unwrap();
        store.set_following("alice", "carol", true).await.unwrap();
        store.set_following("carol", "alice", true).await.unwrap();

        let mut ids = store.following_ids("alice").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["bob", "carol"]);

        let followers = store.list_followers("alice").await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].uid, "carol");
        assert_eq!(store.list_following("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_toggles_keep_counters_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = testing::file_store(&dir.path().join("graph.sqlite")).await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..9 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_following("alice", "bob").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Nine flips from "not following" always end at "following"
        assert!(store.is_following("alice", "bob").await.unwrap());
        assert_eq!(edge_counts(&store, "alice", "bob").await, (1, 1));
        assert_eq!(store.get_profile("alice").await.unwrap().following_count, 1);
        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 1);
    }

    #[tokio::test]
    async fn test_repair_follow_counters() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();
        store.set_following("alice", "bob", true).await.unwrap();

        sqlx::query("UPDATE profile SET followers_count = 7 WHERE uid = 'bob'")
            .execute(store.db())
            .await
            .unwrap();
        store.repair_follow_counters("bob").await.unwrap();

        assert_eq!(store.get_profile("bob").await.unwrap().followers_count, 1);
    }
}
