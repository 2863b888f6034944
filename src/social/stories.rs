/// Stories
///
/// Stories expire `story_ttl` after creation. Expired rows are never
/// deleted, only filtered out at read time.
use super::{check_length, ChangeSet, NewStory, SocialStore, Story, StoryView};
use crate::{
    db::now_millis,
    error::{AuraError, AuraResult},
    live::Topic,
};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;

const MAX_STORY_TEXT: usize = 500;

impl SocialStore {
    pub async fn create_story(&self, author: &str, new: NewStory) -> AuraResult<Story> {
        let text_content = new
            .text_content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let image_url = new
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        if let Some(text) = &text_content {
            check_length("Story text", text, MAX_STORY_TEXT)?;
        }
        if text_content.is_none() && image_url.is_none() {
            return Err(AuraError::Validation(
                "A story needs text or an image".to_string(),
            ));
        }

        self.get_profile(author).await?;

        let now = now_millis();
        let expires = now + self.limits.story_ttl.num_milliseconds();

        let story = sqlx::query_as::<_, Story>(
            "INSERT INTO story (id, author_id, image_url, text_content, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(author)
        .bind(&image_url)
        .bind(&text_content)
        .bind(now)
        .bind(expires)
        .fetch_one(&self.db)
        .await?;

        let mut changes = ChangeSet::default();
        changes.touch(Topic::Stories);
        self.events.emit(changes);

        tracing::info!(story_id = %story.id, author, "Story created");
        Ok(story)
    }

    /// Unexpired stories by one author, newest first
    pub async fn list_active_stories_by_author(&self, author: &str) -> AuraResult<Vec<Story>> {
        let stories = sqlx::query_as::<_, Story>(
            "SELECT * FROM story WHERE author_id = ?1 AND expires_at > ?2
             ORDER BY created_at DESC, id DESC",
        )
        .bind(author)
        .bind(now_millis())
        .fetch_all(&self.db)
        .await?;
        Ok(stories)
    }

    /// The story bar: at most one active story per author
    ///
    /// Authors are the viewer followed by the accounts they follow, most
    /// recently followed first, cut to `story_author_cap`. Each author's
    /// story is the one that expires last. Order follows the author list.
    pub async fn active_stories_for_viewer(&self, viewer: &str) -> AuraResult<Vec<StoryView>> {
        let mut authors = vec![viewer.to_string()];
        authors.extend(
            self.following_ids(viewer)
                .await?
                .into_iter()
                .filter(|uid| uid != viewer),
        );
        authors.truncate(self.limits.story_author_cap.min(self.limits.in_list_cap));

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM story WHERE expires_at > ");
        query.push_bind(now_millis());
        query.push(" AND author_id IN (");
        let mut separated = query.separated(", ");
        for author in &authors {
            separated.push_bind(author);
        }
        separated.push_unseparated(") ORDER BY expires_at DESC, id DESC");

        let stories = query.build_query_as::<Story>().fetch_all(&self.db).await?;

        let mut latest: HashMap<String, Story> = HashMap::new();
        for story in stories {
            latest.entry(story.author_id.clone()).or_insert(story);
        }

        let profiles = self.get_profiles(&authors).await?;

        Ok(authors
            .iter()
            .filter_map(|uid| {
                let story = latest.remove(uid)?;
                let author = profiles.get(uid)?.clone();
                Some(StoryView { story, author })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn text_story(text: &str) -> NewStory {
        NewStory {
            text_content: Some(text.to_string()),
            image_url: None,
        }
    }

    async fn expire(store: &SocialStore, story_id: &str) {
        sqlx::query("UPDATE story SET expires_at = ?1 WHERE id = ?2")
            .bind(now_millis() - 1)
            .bind(story_id)
            .execute(store.db())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_story_sets_expiry() {
        let store = testing_store().await;
        let story = store.create_story("alice", text_story(" hi ")).await.unwrap();

        assert_eq!(story.text_content.as_deref(), Some("hi"));
        assert_eq!(story.expires_at - story.created_at, Duration::hours(24));
    }

    #[tokio::test]
    async fn test_story_needs_content() {
        let store = testing_store().await;
        let result = store.create_story("alice", NewStory::default()).await;
        assert!(matches!(result, Err(AuraError::Validation(_))));

        let long = "x".repeat(MAX_STORY_TEXT + 1);
        let result = store.create_story("alice", text_story(&long)).await;
        assert!(matches!(result, Err(AuraError::Validation(_))));
    }

    #[tokio::test]
    async fn test_expired_stories_filtered_not_deleted() {
        let store = testing_store().await;
        let story = store.create_story("alice", text_story("old")).await.unwrap();
        expire(&store, &story.id).await;

        assert!(store.list_active_stories_by_author("alice").await.unwrap().is_empty());
        assert!(store.active_stories_for_viewer("alice").await.unwrap().is_empty());

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM story")
            .fetch_one(store.db())
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_story_bar_one_per_author_viewer_first() {
        let store = testing_store().await;
        crate::social::testing::add_user(&store, "bob").await.unwrap();
        crate::social::testing::add_user(&store, "carol").await.unwrap();
        store.set_following("alice", "bob", true).await.unwrap();

        store.create_story("bob", text_story("bob 1")).await.unwrap();
        store.create_story("bob", text_story("bob 2")).await.unwrap();
        store.create_story("alice", text_story("mine")).await.unwrap();
        store.create_story("carol", text_story("not followed")).await.unwrap();

        let bar = store.active_stories_for_viewer("alice").await.unwrap();
        let authors: Vec<&str> = bar.iter().map(|s| s.author.uid.as_str()).collect();
        assert_eq!(authors, vec!["alice", "bob"]);
    }

    async fn testing_store() -> SocialStore {
        let store = crate::social::testing::store().await;
        crate::social::testing::add_user(&store, "alice").await.unwrap();
        store
    }
}
