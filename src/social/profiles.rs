/// Profile reads and owner updates
use super::{check_length, ChangeSet, Profile, ProfileUpdate, SocialStore};
use crate::{
    db::{now_millis, transact},
    error::{AuraError, AuraResult},
    live::Topic,
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;

const MAX_DISPLAY_NAME: usize = 50;
const MAX_BIO: usize = 150;

/// Fields fixed at signup
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub uid: String,
    pub email: String,
    pub username: String,
}

/// Placeholder avatar for a new account
pub fn default_photo_url(uid: &str) -> String {
    format!("https://picsum.photos/seed/{}/200", uid)
}

/// Insert a fresh profile: display name is the username, counters start at zero
pub async fn insert_profile(conn: &mut SqliteConnection, new: &NewProfile) -> AuraResult<Profile> {
    let taken: Option<String> = sqlx::query_scalar("SELECT uid FROM profile WHERE username = ?1")
        .bind(&new.username)
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Err(AuraError::Conflict(format!(
            "Username {} already taken",
            new.username
        )));
    }

    let now = now_millis();
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO profile (uid, email, username, display_name, bio, photo_url, created_at)
         VALUES (?1, ?2, ?3, ?3, '', ?4, ?5)
         RETURNING *",
    )
    .bind(&new.uid)
    .bind(&new.email)
    .bind(&new.username)
    .bind(default_photo_url(&new.uid))
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AuraError::Conflict(format!("Username {} already taken", new.username))
        }
        _ => AuraError::Database(e),
    })?;

    Ok(profile)
}

pub(crate) async fn fetch_profile(conn: &mut SqliteConnection, uid: &str) -> AuraResult<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profile WHERE uid = ?1")
        .bind(uid)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(profile)
}

impl SocialStore {
    /// Get a profile by uid
    pub async fn get_profile(&self, uid: &str) -> AuraResult<Profile> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profile WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::NotFound("User not found".to_string()))
    }

    /// Get a profile by username
    pub async fn get_profile_by_username(&self, username: &str) -> AuraResult<Profile> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profile WHERE username = ?1 LIMIT 1")
            .bind(username)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AuraError::NotFound(format!("User {} not found", username)))
    }

    /// Batched lookup; profiles that do not exist are simply absent
    pub async fn get_profiles(&self, uids: &[String]) -> AuraResult<HashMap<String, Profile>> {
        let mut unique: Vec<String> = Vec::with_capacity(uids.len());
        for uid in uids {
            if !unique.contains(uid) {
                unique.push(uid.clone());
            }
        }

        let mut found = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(self.limits.in_list_cap) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM profile WHERE uid IN (");
            let mut separated = query.separated(", ");
            for uid in chunk {
                separated.push_bind(uid);
            }
            separated.push_unseparated(")");

            let rows = query.build_query_as::<Profile>().fetch_all(&self.db).await?;
            for profile in rows {
                found.insert(profile.uid.clone(), profile);
            }
        }

        Ok(found)
    }

    /// Update the caller's own profile
    pub async fn update_profile(&self, uid: &str, update: ProfileUpdate) -> AuraResult<Profile> {
        if let Some(name) = &update.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AuraError::Validation("Display name cannot be empty".to_string()));
            }
            check_length("Display name", name, MAX_DISPLAY_NAME)?;
        }
        if let Some(bio) = &update.bio {
            check_length("Bio", bio, MAX_BIO)?;
        }
        if let Some(url) = &update.photo_url {
            if url.trim().is_empty() {
                return Err(AuraError::Validation("Photo URL cannot be empty".to_string()));
            }
        }

        let uid_owned = uid.to_string();
        let profile = transact(&self.db, &self.retry, "update_profile", |conn| {
            let uid = uid_owned.clone();
            let update = update.clone();
            Box::pin(async move {
                let profile = sqlx::query_as::<_, Profile>(
                    "UPDATE profile SET
                        display_name = COALESCE(?1, display_name),
                        bio = COALESCE(?2, bio),
                        photo_url = COALESCE(?3, photo_url),
                        is_private = COALESCE(?4, is_private)
                     WHERE uid = ?5
                     RETURNING *",
                )
                .bind(update.display_name.as_deref().map(str::trim))
                .bind(update.bio.as_deref())
                .bind(update.photo_url.as_deref())
                .bind(update.is_private)
                .bind(&uid)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| AuraError::NotFound("User not found".to_string()))?;
                Ok(profile)
            })
        })
        .await?;

        let mut changes = ChangeSet::default();
        changes.touch(Topic::Profile(uid.to_string()));
        self.events.emit(changes);

        tracing::info!(uid, "Profile updated");
        Ok(profile)
    }

    /// Username prefix search, ordered by username
    pub async fn search_profiles(&self, term: &str) -> AuraResult<Vec<Profile>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let upper = format!("{}\u{f8ff}", term);
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profile WHERE username >= ?1 AND username <= ?2 ORDER BY username LIMIT ?3",
        )
        .bind(term)
        .bind(upper)
        .bind(self.limits.search)
        .fetch_all(&self.db)
        .await?;

        Ok(profiles)
    }

    /// Most-followed profiles, excluding the viewer
    pub async fn suggested_profiles(&self, viewer: &str) -> AuraResult<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profile WHERE uid != ?1 ORDER BY followers_count DESC, uid LIMIT ?2",
        )
        .bind(viewer)
        .bind(self.limits.suggestions)
        .fetch_all(&self.db)
        .await?;

        Ok(profiles)
    }

    /// Profiles following `uid`, most recent first
    pub async fn list_followers(&self, uid: &str) -> AuraResult<Vec<Profile>> {
        self.get_profile(uid).await?;

        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT p.* FROM followers f
             JOIN profile p ON p.uid = f.follower_uid
             WHERE f.uid = ?1
             ORDER BY f.created_at DESC, p.uid",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await?;

        Ok(profiles)
    }

    /// Profiles `uid` follows, most recent first
    pub async fn list_following(&self, uid: &str) -> AuraResult<Vec<Profile>> {
        self.get_profile(uid).await?;

        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT p.* FROM following f
             JOIN profile p ON p.uid = f.target_uid
             WHERE f.uid = ?1
             ORDER BY f.created_at DESC, p.uid",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await?;

        Ok(profiles)
    }

    /// Whether `viewer` may see content authored by `author`
    pub(crate) async fn can_view(&self, viewer: &str, author: &Profile) -> AuraResult<bool> {
        if !author.is_private || viewer == author.uid {
            return Ok(true);
        }
        self.is_following(viewer, &author.uid).await
    }

    pub(crate) async fn ensure_can_view(&self, viewer: &str, author: &Profile) -> AuraResult<()> {
        if self.can_view(viewer, author).await? {
            Ok(())
        } else {
            Err(AuraError::Authorization(format!(
                "{}'s account is private",
                author.username
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::testing;

    #[tokio::test]
    async fn test_new_profile_defaults() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        let profile = store.get_profile("alice").await.unwrap();
        assert_eq!(profile.display_name, "alice");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.photo_url, "https://picsum.photos/seed/alice/200");
        assert_eq!(profile.followers_count, 0);
        assert_eq!(profile.following_count, 0);
        assert!(!profile.is_private);
    }

    #[tokio::test]
    async fn test_duplicate_username_conflict() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        sqlx::query("INSERT INTO account (uid, email, password_hash, created_at) VALUES ('u2', 'b@example.com', 'x', 0)")
            .execute(store.db())
            .await
            .unwrap();
        let mut conn = store.db().acquire().await.unwrap();
        let result = insert_profile(
            &mut conn,
            &NewProfile {
                uid: "u2".to_string(),
                email: "b@example.com".to_string(),
                username: "alice".to_string(),
            },
        )
        .await;

        match result.unwrap_err() {
            AuraError::Conflict(_) => {}
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_profile_by_username() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        assert_eq!(store.get_profile_by_username("alice").await.unwrap().uid, "alice");
        assert!(matches!(
            store.get_profile_by_username("bob").await,
            Err(AuraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_profiles_omits_missing() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();
        testing::add_user(&store, "bob").await.unwrap();

        let ids = vec!["alice".to_string(), "ghost".to_string(), "bob".to_string()];
        let found = store.get_profiles(&ids).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("alice"));
        assert!(!found.contains_key("ghost"));
    }

    #[tokio::test]
    async fn test_get_profiles_beyond_in_list_cap() {
        let store = testing::store().await;
        let mut ids = Vec::new();
        for i in 0..45 {
            let uid = format!("user{:02}", i);
            testing::add_user(&store, &uid).await.unwrap();
            ids.push(uid);
        }

        let found = store.get_profiles(&ids).await.unwrap();
        assert_eq!(found.len(), 45);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        let updated = store
            .update_profile(
                "alice",
                ProfileUpdate {
                    display_name: Some("  Alice A.  ".to_string()),
                    bio: Some("hello".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.display_name, "Alice A.");
        assert_eq!(updated.bio, "hello");
        assert_eq!(updated.photo_url, "https://picsum.photos/seed/alice/200");
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let store = testing::store().await;
        testing::add_user(&store, "alice").await.unwrap();

        let result = store
            .update_profile(
                "alice",
                ProfileUpdate {
                    bio: Some("x".repeat(151)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AuraError::Validation(_))));

        let result = store
            .update_profile(
                "alice",
                ProfileUpdate {
                    display_name: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AuraError::Validation(_))));
    }

    #[tokio::test]
    async fn test_search_by_prefix() {
        let store = testing::store().await;
        for uid in ["alice", "alicia", "bob", "al"] {
            testing::add_user(&store, uid).await.unwrap();
        }

        let names: Vec<String> = store
            .search_profiles("ali")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["alice", "alicia"]);

        assert!(store.search_profiles("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_ordered_by_followers() {
        let store = testing::store().await;
        for uid in ["alice", "bob", "carol"] {
            testing::add_user(&store, uid).await.unwrap();
        }
        store.set_following("alice", "carol", true).await.unwrap();
        store.set_following("bob", "carol", true).await.unwrap();
        store.set_following("carol", "bob", true).await.unwrap();

        let names: Vec<String> = store
            .suggested_profiles("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.uid)
            .collect();
        assert_eq!(names, vec!["carol", "bob"]);
    }
}
