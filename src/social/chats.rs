/// Direct messages
///
/// A chat has exactly two members, stored as an ordered pair so each pair
/// maps to one chat.
use super::{
    check_length, notifications::insert_notification, profiles::fetch_profile, ChangeSet, Chat,
    ChatView, Message, NewNotification, NotificationKind, SocialStore,
};
use crate::{
    db::{now_millis, transact},
    error::{AuraError, AuraResult},
    live::Topic,
};
use uuid::Uuid;

const MAX_MESSAGE: usize = 1000;

fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl SocialStore {
    /// Get or create the chat between `actor` and `other`
    pub async fn open_chat(&self, actor: &str, other: &str) -> AuraResult<Chat> {
        if actor == other {
            return Err(AuraError::Validation(
                "Cannot start a chat with yourself".to_string(),
            ));
        }
        self.get_profile(actor).await?;
        self.get_profile(other).await?;

        let (member_a, member_b) = ordered_pair(actor, other);
        let now = now_millis();

        let inserted = sqlx::query(
            "INSERT INTO chat (id, member_a, member_b, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (member_a, member_b) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(member_a)
        .bind(member_b)
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();

        let chat = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chat WHERE member_a = ?1 AND member_b = ?2",
        )
        .bind(member_a)
        .bind(member_b)
        .fetch_one(&self.db)
        .await?;

        if inserted > 0 {
            tracing::info!(chat_id = %chat.id, actor, other, "Chat created");
            let mut changes = ChangeSet::default();
            changes.touch(Topic::ChatList(actor.to_string()));
            changes.touch(Topic::ChatList(other.to_string()));
            self.events.emit(changes);
        }

        Ok(chat)
    }

    /// A chat, only if `actor` is a member
    pub async fn get_chat(&self, actor: &str, chat_id: &str) -> AuraResult<Chat> {
        sqlx::query_as::<_, Chat>(
            "SELECT * FROM chat WHERE id = ?1 AND (member_a = ?2 OR member_b = ?2)",
        )
        .bind(chat_id)
        .bind(actor)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AuraError::NotFound("Chat not found".to_string()))
    }

    /// The caller's chats, most recently active first
    pub async fn list_chats(&self, uid: &str) -> AuraResult<Vec<ChatView>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chat WHERE member_a = ?1 OR member_b = ?1
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(uid)
        .fetch_all(&self.db)
        .await?;

        let others: Vec<String> = chats
            .iter()
            .filter_map(|chat| chat.other_member(uid).map(str::to_string))
            .collect();
        let profiles = self.get_profiles(&others).await?;

        Ok(chats
            .into_iter()
            .filter_map(|chat| {
                let other = profiles.get(chat.other_member(uid)?)?.clone();
                Some(ChatView { chat, other })
            })
            .collect())
    }

    /// Messages in a chat, oldest first
    pub async fn list_messages(&self, actor: &str, chat_id: &str) -> AuraResult<Vec<Message>> {
        self.get_chat(actor, chat_id).await?;

        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM message WHERE chat_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.db)
        .await?;
        Ok(messages)
    }

    /// Append a message and update the chat summary in one transaction
    pub async fn send_message(&self, actor: &str, chat_id: &str, text: &str) -> AuraResult<Message> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AuraError::Validation("Message cannot be empty".to_string()));
        }
        check_length("Message", &text, MAX_MESSAGE)?;

        let actor_owned = actor.to_string();
        let chat_owned = chat_id.to_string();
        let (message, changes) = transact(&self.db, &self.retry, "send_message", |conn| {
            let actor = actor_owned.clone();
            let chat_id = chat_owned.clone();
            let text = text.clone();
            Box::pin(async move {
                let chat = sqlx::query_as::<_, Chat>(
                    "SELECT * FROM chat WHERE id = ?1 AND (member_a = ?2 OR member_b = ?2)",
                )
                .bind(&chat_id)
                .bind(&actor)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| AuraError::NotFound("Chat not found".to_string()))?;

                let recipient = chat
                    .other_member(&actor)
                    .map(str::to_string)
                    .ok_or_else(|| AuraError::Internal("Chat has no second member".to_string()))?;

                let now = now_millis();
                let message = sqlx::query_as::<_, Message>(
                    "INSERT INTO message (id, chat_id, sender_id, text, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING *",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&chat_id)
                .bind(&actor)
                .bind(&text)
                .bind(now)
                .fetch_one(&mut *conn)
                .await?;

                sqlx::query(
                    "UPDATE chat SET last_message = ?1, last_message_at = ?2, updated_at = ?2
                     WHERE id = ?3",
                )
                .bind(&text)
                .bind(now)
                .bind(&chat_id)
                .execute(&mut *conn)
                .await?;

                let mut changes = ChangeSet::default();
                if fetch_profile(conn, &recipient).await?.is_some() {
                    let notification = insert_notification(
                        conn,
                        NewNotification {
                            recipient_id: recipient.clone(),
                            sender_id: actor.clone(),
                            kind: NotificationKind::Message,
                            post_id: None,
                            chat_id: Some(chat_id.clone()),
                        },
                    )
                    .await?;
                    changes.notify(notification);
                }
                changes.touch(Topic::Chat(chat_id));
                changes.touch(Topic::ChatList(actor));
                changes.touch(Topic::ChatList(recipient));

                Ok((message, changes))
            })
        })
        .await?;

        self.events.emit(changes);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::testing;

    async fn setup() -> SocialStore {
        let store = testing::store().await;
        for uid in ["alice", "bob", "carol"] {
            testing::add_user(&store, uid).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_open_chat_is_idempotent_per_pair() {
        let store = setup().await;

        let first = store.open_chat("alice", "bob").await.unwrap();
        let second = store.open_chat("bob", "alice").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.members, vec!["alice".to_string(), "bob".to_string()]);
        assert!(first.last_message.is_none());

        assert!(matches!(
            store.open_chat("alice", "alice").await,
            Err(AuraError::Validation(_))
        ));
        assert!(matches!(
            store.open_chat("alice", "ghost").await,
            Err(AuraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_message_updates_summary_and_notifies() {
        let store = setup().await;
        let chat = store.open_chat("alice", "bob").await.unwrap();

        store.send_message("alice", &chat.id, "hey").await.unwrap();
        store.send_message("bob", &chat.id, " hi back ").await.unwrap();

        let messages = store.list_messages("alice", &chat.id).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["hey", "hi back"]);

        let chat = store.get_chat("bob", &chat.id).await.unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("hi back"));
        assert_eq!(chat.last_message_at, Some(chat.updated_at));

        let bob_notes = store.list_notifications("bob").await.unwrap();
        assert_eq!(bob_notes.len(), 1);
        assert_eq!(bob_notes[0].notification.kind, NotificationKind::Message);
        assert_eq!(bob_notes[0].notification.chat_id.as_deref(), Some(chat.id.as_str()));
    }

    #[tokio::test]
    async fn test_non_member_cannot_read_or_write() {
        let store = setup().await;
        let chat = store.open_chat("alice", "bob").await.unwrap();

        assert!(matches!(
            store.list_messages("carol", &chat.id).await,
            Err(AuraError::NotFound(_))
        ));
        assert!(matches!(
            store.send_message("carol", &chat.id, "let me in").await,
            Err(AuraError::NotFound(_))
        ));
        assert!(matches!(
            store.send_message("alice", &chat.id, "   ").await,
            Err(AuraError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_chats_most_recent_first() {
        let store = setup().await;
        let with_bob = store.open_chat("alice", "bob").await.unwrap();
        let with_carol = store.open_chat("alice", "carol").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.send_message("alice", &with_bob.id, "ping").await.unwrap();

        let chats = store.list_chats("alice").await.unwrap();
        let ids: Vec<&str> = chats.iter().map(|c| c.chat.id.as_str()).collect();
        assert_eq!(ids, vec![with_bob.id.as_str(), with_carol.id.as_str()]);
        assert_eq!(chats[0].other.uid, "bob");
    }
}
