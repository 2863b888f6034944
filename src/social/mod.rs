/// Social document layer
///
/// Profiles, the follow graph, posts, likes, comments, notifications,
/// stories, chats and the home feed. Reads are plain queries; every write
/// that touches more than one record runs through [`crate::db::transact`].
/// After a commit the touched topics are published on the change bus and
/// any notifications created are handed to the push trigger.

pub mod chats;
pub mod counters;
pub mod engagement;
pub mod feed;
pub mod graph;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod stories;

pub use counters::Counter;
pub use models::*;

use crate::{
    config::ServerConfig,
    db::RetryPolicy,
    live::{ChangeBus, Topic},
    metrics,
    push::NotificationOutbox,
};
use chrono::Duration;
use sqlx::SqlitePool;

/// Maximum number of ids allowed in a single `IN (...)` query
pub const MAX_IN_LIST: usize = 30;

/// Query limits for list views
#[derive(Debug, Clone)]
pub struct SocialLimits {
    pub in_list_cap: usize,
    pub feed_per_chunk: u32,
    pub feed_display: usize,
    pub story_ttl: Duration,
    pub story_author_cap: usize,
    pub notifications: u32,
    pub search: u32,
    pub suggestions: u32,
}

impl Default for SocialLimits {
    fn default() -> Self {
        Self {
            in_list_cap: MAX_IN_LIST,
            feed_per_chunk: 20,
            feed_display: 50,
            story_ttl: Duration::hours(24),
            story_author_cap: 10,
            notifications: 30,
            search: 10,
            suggestions: 10,
        }
    }
}

impl SocialLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            in_list_cap: config.feed.in_list_cap.clamp(1, MAX_IN_LIST),
            feed_per_chunk: config.feed.per_chunk_limit,
            feed_display: config.feed.display_limit,
            story_ttl: Duration::hours(config.stories.ttl_hours),
            story_author_cap: config.stories.author_cap,
            ..Self::default()
        }
    }
}

/// Side effects of a committed transaction
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub topics: Vec<Topic>,
    pub notifications: Vec<Notification>,
}

impl ChangeSet {
    pub fn touch(&mut self, topic: Topic) {
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
    }

    pub fn notify(&mut self, notification: Notification) {
        self.touch(Topic::Notifications(notification.recipient_id.clone()));
        self.notifications.push(notification);
    }
}

/// Where committed changes go
#[derive(Clone)]
pub struct EventSink {
    bus: ChangeBus,
    outbox: Option<NotificationOutbox>,
}

impl EventSink {
    pub fn new(bus: ChangeBus, outbox: Option<NotificationOutbox>) -> Self {
        Self { bus, outbox }
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Publish a committed change set
    pub fn emit(&self, changes: ChangeSet) {
        self.bus.publish_all(changes.topics);

        for notification in changes.notifications {
            metrics::record_notification_created(notification.kind.as_str());
            if let Some(outbox) = &self.outbox {
                outbox.enqueue(notification);
            }
        }
    }
}

/// Store for all social records
#[derive(Clone)]
pub struct SocialStore {
    db: SqlitePool,
    retry: RetryPolicy,
    limits: SocialLimits,
    events: EventSink,
}

impl SocialStore {
    pub fn new(db: SqlitePool, retry: RetryPolicy, limits: SocialLimits, events: EventSink) -> Self {
        Self {
            db,
            retry,
            limits,
            events,
        }
    }

    pub fn limits(&self) -> &SocialLimits {
        &self.limits
    }

    pub fn bus(&self) -> &ChangeBus {
        self.events.bus()
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }
}

/// Check free-form text against a maximum length in characters
pub(crate) fn check_length(field: &str, value: &str, max: usize) -> crate::error::AuraResult<()> {
    if value.chars().count() > max {
        return Err(crate::error::AuraError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_dedups_topics() {
        let mut changes = ChangeSet::default();
        changes.touch(Topic::Profile("a".to_string()));
        changes.touch(Topic::Profile("a".to_string()));
        changes.touch(Topic::Profile("b".to_string()));
        assert_eq!(changes.topics.len(), 2);
    }

    #[test]
    fn test_limits_clamp_in_list_cap() {
        let mut config = ServerConfig::new(
            std::path::PathBuf::from("./data"),
            "0123456789abcdef0123456789abcdef".to_string(),
        );
        config.feed.in_list_cap = 100;
        assert_eq!(SocialLimits::from_config(&config).in_list_cap, MAX_IN_LIST);
    }

    #[test]
    fn test_check_length_counts_chars() {
        assert!(check_length("bio", "héllo", 5).is_ok());
        assert!(check_length("bio", "héllo!", 5).is_err());
    }
}
