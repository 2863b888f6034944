/// Likes and comments
use super::{
    check_length,
    counters::{self, Counter},
    notifications::insert_notification,
    ChangeSet, Comment, CommentView, NewNotification, NotificationKind, Post, RelationshipChange,
    SocialStore,
};
use crate::{
    db::{now_millis, transact},
    error::{AuraError, AuraResult},
    live::Topic,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashSet;
use uuid::Uuid;

const MAX_COMMENT: usize = 500;

async fn load_post(conn: &mut SqliteConnection, post_id: &str) -> AuraResult<Post> {
    sqlx::query_as::<_, Post>("SELECT * FROM post WHERE id = ?1")
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AuraError::NotFound("Post not found".to_string()))
}

async fn like_exists(conn: &mut SqliteConnection, uid: &str, post_id: &str) -> AuraResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM post_like WHERE post_id = ?1 AND uid = ?2")
            .bind(post_id)
            .bind(uid)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

async fn apply_like(
    conn: &mut SqliteConnection,
    actor: &str,
    post_id: &str,
    desired: Option<bool>,
) -> AuraResult<(RelationshipChange, ChangeSet)> {
    let post = load_post(conn, post_id).await?;
    let current = like_exists(conn, actor, post_id).await?;
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

    if want {
        sqlx::query("INSERT INTO post_like (post_id, uid, created_at) VALUES (?1, ?2, ?3)")
            .bind(post_id)
            .bind(actor)
            .bind(now_millis())
            .execute(&mut *conn)
            .await?;
        counters::apply_delta(conn, &Counter::Likes(post_id.to_string()), 1).await?;

        if post.author_id != actor {
            let notification = insert_notification(
                conn,
                NewNotification {
                    recipient_id: post.author_id.clone(),
                    sender_id: actor.to_string(),
                    kind: NotificationKind::Like,
                    post_id: Some(post_id.to_string()),
                    chat_id: None,
                },
            )
            .await?;
            changes.notify(notification);
        }
    } else {
        sqlx::query("DELETE FROM post_like WHERE post_id = ?1 AND uid = ?2")
            .bind(post_id)
            .bind(actor)
            .execute(&mut *conn)
            .await?;
        counters::apply_delta(conn, &Counter::Likes(post_id.to_string()), -1).await?;
    }

    changes.touch(Topic::Post(post_id.to_string()));
    changes.touch(Topic::PostLikes(post_id.to_string()));

    Ok((
        RelationshipChange {
            active: want,
            changed: true,
        },
        changes,
    ))
}

impl SocialStore {
    pub async fn has_liked(&self, uid: &str, post_id: &str) -> AuraResult<bool> {
        let mut conn = self.db.acquire().await?;
        like_exists(&mut conn, uid, post_id).await
    }

    /// Which of `post_ids` `uid` has liked
    pub async fn liked_post_ids(&self, uid: &str, post_ids: &[String]) -> AuraResult<HashSet<String>> {
        let mut liked = HashSet::new();

        for chunk in post_ids.chunks(self.limits.in_list_cap) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT post_id FROM post_like WHERE uid = ");
            query.push_bind(uid);
            query.push(" AND post_id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let ids: Vec<String> = query.build_query_scalar::<String>().fetch_all(&self.db).await?;
            liked.extend(ids);
        }

        Ok(liked)
    }

    /// Set whether `actor` likes a post
    pub async fn set_like(&self, actor: &str, post_id: &str, desired: bool) -> AuraResult<RelationshipChange> {
        self.write_like(actor, post_id, Some(desired)).await
    }

    /// Flip whether `actor` likes a post
    pub async fn toggle_like(&self, actor: &str, post_id: &str) -> AuraResult<RelationshipChange> {
        self.write_like(actor, post_id, None).await
    }

    async fn write_like(
        &self,
        actor: &str,
        post_id: &str,
        desired: Option<bool>,
    ) -> AuraResult<RelationshipChange> {
        let actor_owned = actor.to_string();
        let post_owned = post_id.to_string();
        let (change, changes) = transact(&self.db, &self.retry, "like", |conn| {
            let actor = actor_owned.clone();
            let post_id = post_owned.clone();
            Box::pin(async move { apply_like(conn, &actor, &post_id, desired).await })
        })
        .await?;

        if change.changed {
            tracing::debug!(actor, post_id, liked = change.active, "Like state changed");
        }
        self.events.emit(changes);

        Ok(change)
    }

    /// Add a comment and bump the post's comment counter
    pub async fn add_comment(&self, actor: &str, post_id: &str, text: &str) -> AuraResult<Comment> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AuraError::Validation("Comment cannot be empty".to_string()));
        }
        check_length("Comment", &text, MAX_COMMENT)?;

        let actor_owned = actor.to_string();
        let post_owned = post_id.to_string();
        let (comment, changes) = transact(&self.db, &self.retry, "add_comment", |conn| {
            let actor = actor_owned.clone();
            let post_id = post_owned.clone();
            let text = text.clone();
            Box::pin(async move {
                let post = load_post(conn, &post_id).await?;
                if post.commenting_disabled {
                    return Err(AuraError::Validation(
                        "Comments are turned off for this post".to_string(),
                    ));
                }

                let comment = sqlx::query_as::<_, Comment>(
                    "INSERT INTO comment (id, post_id, author_id, text, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING *",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&post_id)
                .bind(&actor)
                .bind(&text)
                .bind(now_millis())
                .fetch_one(&mut *conn)
                .await?;

                counters::apply_delta(conn, &Counter::Comments(post_id.clone()), 1).await?;

                let mut changes = ChangeSet::default();
                if post.author_id != actor {
                    let notification = insert_notification(
                        conn,
                        NewNotification {
                            recipient_id: post.author_id.clone(),
                            sender_id: actor.clone(),
                            kind: NotificationKind::Comment,
                            post_id: Some(post_id.clone()),
                            chat_id: None,
                        },
                    )
                    .await?;
                    changes.notify(notification);
                }
                changes.touch(Topic::Post(post_id.clone()));
                changes.touch(Topic::Comments(post_id));

                Ok((comment, changes))
            })
        })
        .await?;

        self.events.emit(changes);
        Ok(comment)
    }

    /// Comments on a post, oldest first, with authors
    pub async fn list_comments(&self, viewer: &str, post_id: &str) -> AuraResult<Vec<CommentView>> {
        self.get_post_for(viewer, post_id).await?;

        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comment WHERE post_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        self.attach_comment_authors(comments).await
    }

    /// Comments written by `uid`, newest first
    pub async fn comments_by_author(&self, uid: &str) -> AuraResult<Vec<CommentView>> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT * FROM comment WHERE author_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await?;

        self.attach_comment_authors(comments).await
    }

    async fn attach_comment_authors(&self, comments: Vec<Comment>) -> AuraResult<Vec<CommentView>> {
        let author_ids: Vec<String> = comments.iter().map(|c| c.author_id.clone()).collect();
        let authors = self.get_profiles(&author_ids).await?;

        Ok(comments
            .into_iter()
            .filter_map(|comment| {
                let author = authors.get(&comment.author_id)?.clone();
                Some(CommentView { comment, author })
            })
            .collect())
    }

    /// Recompute a post's like and comment counters from their records
    pub async fn repair_post_counters(&self, post_id: &str) -> AuraResult<()> {
        let post_owned = post_id.to_string();
        transact(&self.db, &self.retry, "repair_post_counters", |conn| {
            let post_id = post_owned.clone();
            Box::pin(async move {
                counters::recount(conn, &Counter::Likes(post_id.clone())).await?;
                counters::recount(conn, &Counter::Comments(post_id)).await?;
                Ok(())
            })
        })
        .await
    }
}
