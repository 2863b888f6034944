/// Social data models
use crate::db::millis_to_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Public user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub uid: String,
    #[serde(skip_serializing, default)]
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub bio: String,
    pub photo_url: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Profile {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            uid: row.try_get("uid")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            bio: row.try_get("bio")?,
            photo_url: row.try_get("photo_url")?,
            followers_count: row.try_get("followers_count")?,
            following_count: row.try_get("following_count")?,
            is_private: row.try_get("is_private")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
        })
    }
}

/// Owner-editable profile fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub caption: String,
    pub image_url: Option<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub likes_hidden: bool,
    pub commenting_disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Zero the like count unless the viewer is the author or likes are public
    pub fn masked_for(mut self, viewer: &str) -> Self {
        if self.likes_hidden && self.author_id != viewer {
            self.like_count = 0;
        }
        self
    }
}

impl<'r> FromRow<'r, SqliteRow> for Post {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            author_id: row.try_get("author_id")?,
            caption: row.try_get("caption")?,
            image_url: row.try_get("image_url")?,
            like_count: row.try_get("like_count")?,
            comment_count: row.try_get("comment_count")?,
            likes_hidden: row.try_get("likes_hidden")?,
            commenting_disabled: row.try_get("commenting_disabled")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(default)]
    pub caption: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub likes_hidden: bool,
    #[serde(default)]
    pub commenting_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Comment {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            post_id: row.try_get("post_id")?,
            author_id: row.try_get("author_id")?,
            text: row.try_get("text")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
        })
    }
}

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Message => "message",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            "follow" => Ok(NotificationKind::Follow),
            "message" => Ok(NotificationKind::Message),
            other => Err(format!("unknown notification kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub chat_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            recipient_id: row.try_get("recipient_id")?,
            sender_id: row.try_get("sender_id")?,
            kind: kind.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "kind".to_string(),
                source: e.into(),
            })?,
            post_id: row.try_get("post_id")?,
            chat_id: row.try_get("chat_id")?,
            read: row.try_get("read")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
        })
    }
}

/// Notification about to be written inside another transaction
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub author_id: String,
    pub image_url: Option<String>,
    pub text_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Story {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            author_id: row.try_get("author_id")?,
            image_url: row.try_get("image_url")?,
            text_content: row.try_get("text_content")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
            expires_at: millis_to_datetime(row.try_get("expires_at")?),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStory {
    pub text_content: Option<String>,
    pub image_url: Option<String>,
}

/// Two-member conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub members: Vec<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_member(&self, uid: &str) -> bool {
        self.members.iter().any(|m| m == uid)
    }

    /// The member that is not `uid`
    pub fn other_member(&self, uid: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.as_str() != uid)
            .map(String::as_str)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Chat {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let last_message_at: Option<i64> = row.try_get("last_message_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            members: vec![row.try_get("member_a")?, row.try_get("member_b")?],
            last_message: row.try_get("last_message")?,
            last_message_at: last_message_at.map(millis_to_datetime),
            created_at: millis_to_datetime(row.try_get("created_at")?),
            updated_at: millis_to_datetime(row.try_get("updated_at")?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Message {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            text: row.try_get("text")?,
            created_at: millis_to_datetime(row.try_get("created_at")?),
        })
    }
}

/// Result of a desired-state relationship write (follow, like)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipChange {
    /// State after the write
    pub active: bool,
    /// Whether the write flipped the state
    pub changed: bool,
}

/// Post joined with its author and the viewer's like state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub post: Post,
    pub author: Profile,
    pub liked_by_viewer: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Profile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Profile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    #[serde(flatten)]
    pub story: Story,
    pub author: Profile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: Chat,
    pub other: Profile,
}
