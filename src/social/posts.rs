/// Posts
use super::{check_length, NewPost, Post, SocialStore, MAX_IN_LIST};
use crate::{
    db::now_millis,
    error::{AuraError, AuraResult},
};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

const MAX_CAPTION: usize = 2200;

impl SocialStore {
    /// Create a post; counters start at zero
    pub async fn create_post(&self, author: &str, new: NewPost) -> AuraResult<Post> {
        let caption = new.caption.trim().to_string();
        let image_url = new
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        check_length("Caption", &caption, MAX_CAPTION)?;
        if caption.is_empty() && image_url.is_none() {
            return Err(AuraError::Validation(
                "A post needs a caption or an image".to_string(),
            ));
        }

        self.get_profile(author).await?;

        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO post (id, author_id, caption, image_url, likes_hidden, commenting_disabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(author)
        .bind(&caption)
        .bind(&image_url)
        .bind(new.likes_hidden)
        .bind(new.commenting_disabled)
        .bind(now_millis())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(post_id = %post.id, author, "Post created");
        Ok(post)
    }

    /// Get a post without visibility checks
    pub async fn get_post(&self, post_id: &str) -> AuraResult<Post> {
        sqlx::query_as::<_, Post>("SELECT * FROM post WHERE id = ?1")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::NotFound("Post not found".to_string()))
    }

    /// Get a post as seen by `viewer`
    pub async fn get_post_for(&self, viewer: &str, post_id: &str) -> AuraResult<Post> {
        let post = self.get_post(post_id).await?;
        let author = self.get_profile(&post.author_id).await?;
        self.ensure_can_view(viewer, &author).await?;
        Ok(post)
    }

    /// Posts by one author, newest first
    pub async fn list_posts_by_author(&self, viewer: &str, author: &str) -> AuraResult<Vec<Post>> {
        let profile = self.get_profile(author).await?;
        self.ensure_can_view(viewer, &profile).await?;

        let posts = sqlx::query_as::<_, Post>(
            "SELECT * FROM post WHERE author_id = ?1 ORDER BY created_at DESC, id DESC",
        )
        .bind(author)
        .fetch_all(&self.db)
        .await?;

        Ok(posts)
    }

    /// Newest posts by any of `authors`, at most `limit`
    ///
    /// This is the bounded `IN` query; callers must chunk larger id sets.
    pub async fn list_posts_by_authors(&self, authors: &[String], limit: u32) -> AuraResult<Vec<Post>> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        if authors.len() > self.limits.in_list_cap.min(MAX_IN_LIST) {
            return Err(AuraError::Validation(format!(
                "At most {} authors per query, got {}",
                self.limits.in_list_cap,
                authors.len()
            )));
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM post WHERE author_id IN (");
        let mut separated = query.separated(", ");
        for author in authors {
            separated.push_bind(author);
        }
        separated.push_unseparated(") ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(limit);

        let posts = query.build_query_as::<Post>().fetch_all(&self.db).await?;
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::{testing, ProfileUpdate};

    fn text_post(caption: &str) -> NewPost {
        NewPost {
            caption: caption.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        let post = store.create_post("alice", text_post("  hello  ")).await.unwrap();
        assert_eq!(post.caption, "hello");
        assert_eq!(post.like_count, 0);
        assert_eq!(post.comment_count, 0);

        let fetched = store.get_post(&post.id).await.unwrap();
        assert_eq!(fetched, post);
    }

    #[tokio::test]
    async fn test_post_needs_content() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        let result = store
            .create_post(
                "alice",
                NewPost {
                    caption: "  ".to_string(),
                    image_url: Some(" ".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AuraError::Validation(_))));

        let image_only = store
            .create_post(
                "alice",
                NewPost {
                    image_url: Some("http://localhost/media/posts/alice/1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(image_only.caption, "");
    }

    #[tokio::test]
    async fn test_list_by_author_newest_first() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        for caption in ["one", "two", "three"] {
            store.create_post("alice", text_post(caption)).await.unwrap();
        }

        let posts = store.list_posts_by_author("alice", "alice").await.unwrap();
        assert_eq!(posts.len(), 3);
        for pair in posts.windows(2) {
            assert!(
                (pair[0].created_at, &pair[0].id) >= (pair[1].created_at, &pair[1].id)
            );
        }
    }

    #[tokio::test]
    async fn test_private_author_visible_to_followers_only() {
        let store = testing::store().await;
        for uid in ["alice", "bob", "carol"] {
            testing::add_user(&store, uid).await.unwrap();
        }
        let post = store.create_post("alice", text_post("secret")).await.unwrap();
        store
            .update_profile(
                "alice",
                ProfileUpdate {
                    is_private: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.set_following("bob", "alice", true).await.unwrap();

        assert_eq!(store.list_posts_by_author("bob", "alice").await.unwrap().len(), 1);
        assert!(store.get_post_for("alice", &post.id).await.is_ok());
        assert!(matches!(
            store.list_posts_by_author("carol", "alice").await,
            Err(AuraError::Authorization(_))
        ));
        assert!(matches!(
            store.get_post_for("carol", &post.id).await,
            Err(AuraError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_in_list_cap_enforced() {
        let store = testing::store().await;
        let authors: Vec<String> = (0..31).map(|i| format!("user{}", i)).collect();

        let result = store.list_posts_by_authors(&authors, 20).await;
        assert!(matches!(result, Err(AuraError::Validation(_))));
        assert!(store.list_posts_by_authors(&authors[..30], 20).await.unwrap().is_empty());
        assert!(store.list_posts_by_authors(&[], 20).await.unwrap().is_empty());
    }
}
