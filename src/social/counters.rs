/// Denormalized counters
///
/// Counters only change through [`apply_delta`], inside the same
/// transaction that creates or removes the existence record they count.
/// The update clamps at zero, and the schema refuses negative values.
use crate::error::{AuraError, AuraResult};
use sqlx::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Counter {
    /// `profile.followers_count` of a user
    Followers(String),
    /// `profile.following_count` of a user
    Following(String),
    /// `post.like_count` of a post
    Likes(String),
    /// `post.comment_count` of a post
    Comments(String),
}

impl Counter {
    fn statements(&self) -> (&'static str, &'static str, &'static str) {
        // (update, read, recount)
        match self {
            Counter::Followers(_) => (
                "UPDATE profile SET followers_count = MAX(0, followers_count + ?1) WHERE uid = ?2 RETURNING followers_count",
                "SELECT followers_count FROM profile WHERE uid = ?1",
                "SELECT COUNT(*) FROM followers WHERE uid = ?1",
            ),
            Counter::Following(_) => (
                "UPDATE profile SET following_count = MAX(0, following_count + ?1) WHERE uid = ?2 RETURNING following_count",
                "SELECT following_count FROM profile WHERE uid = ?1",
                "SELECT COUNT(*) FROM following WHERE uid = ?1",
            ),
            Counter::Likes(_) => (
                "UPDATE post SET like_count = MAX(0, like_count + ?1) WHERE id = ?2 RETURNING like_count",
                "SELECT like_count FROM post WHERE id = ?1",
                "SELECT COUNT(*) FROM post_like WHERE post_id = ?1",
            ),
            Counter::Comments(_) => (
                "UPDATE post SET comment_count = MAX(0, comment_count + ?1) WHERE id = ?2 RETURNING comment_count",
                "SELECT comment_count FROM post WHERE id = ?1",
                "SELECT COUNT(*) FROM comment WHERE post_id = ?1",
            ),
        }
    }

    fn key(&self) -> &str {
        match self {
            Counter::Followers(id)
            | Counter::Following(id)
            | Counter::Likes(id)
            | Counter::Comments(id) => id,
        }
    }

    fn not_found(&self) -> AuraError {
        match self {
            Counter::Followers(_) | Counter::Following(_) => {
                AuraError::NotFound("User not found".to_string())
            }
            Counter::Likes(_) | Counter::Comments(_) => {
                AuraError::NotFound("Post not found".to_string())
            }
        }
    }
}

/// Add `delta` to a counter, never going below zero; returns the new value
pub async fn apply_delta(conn: &mut SqliteConnection, counter: &Counter, delta: i64) -> AuraResult<i64> {
    let (update, _, _) = counter.statements();

    sqlx::query_scalar::<_, i64>(update)
        .bind(delta)
        .bind(counter.key())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| counter.not_found())
}

/// Current stored value of a counter
pub async fn read(conn: &mut SqliteConnection, counter: &Counter) -> AuraResult<i64> {
    let (_, read, _) = counter.statements();

    sqlx::query_scalar::<_, i64>(read)
        .bind(counter.key())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| counter.not_found())
}

/// Recompute a counter from its existence records and store it
///
/// Returns `(stored, actual)`; they differ only if the counter had drifted.
pub async fn recount(conn: &mut SqliteConnection, counter: &Counter) -> AuraResult<(i64, i64)> {
    let (_, _, count_sql) = counter.statements();

    let stored = read(conn, counter).await?;
    let actual: i64 = sqlx::query_scalar(count_sql)
        .bind(counter.key())
        .fetch_one(&mut *conn)
        .await?;

    if stored != actual {
        tracing::warn!(?counter, stored, actual, "Counter drift repaired");
        apply_delta(conn, counter, actual - stored).await?;
    }

    Ok((stored, actual))
}
