/// Push notifications
///
/// Every notification written by the social layer is handed to the trigger
/// after commit. The trigger looks up the recipient's device token and the
/// sender's profile, composes a title and body for the notification kind,
/// and makes one delivery attempt through the configured gateway.

pub mod dispatcher;
pub mod fcm;
pub mod tokens;
pub mod trigger;

pub use dispatcher::{DispatchOutcome, PushDispatcher};
pub use fcm::{FcmPushGateway, ServiceAccountKey};
pub use tokens::PushTokenStore;
pub use trigger::{notification_channel, spawn_trigger, NotificationInbox, NotificationOutbox};

use crate::{config::PushConfig, error::AuraResult, social::NotificationKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_ICON: &str = "/favicon.ico";
const DEFAULT_CLICK_ACTION: &str = "/";

/// Displayable push payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub click_action: String,
}

/// Build the title and body shown for a notification kind
pub fn compose(kind: NotificationKind, sender_username: &str) -> PushMessage {
    let name = if sender_username.trim().is_empty() {
        "Someone"
    } else {
        sender_username
    };

    let (title, body) = match kind {
        NotificationKind::Like => ("New Like!".to_string(), format!("{} liked your post.", name)),
        NotificationKind::Comment => (
            "New Comment!".to_string(),
            format!("{} commented on your post.", name),
        ),
        NotificationKind::Follow => (
            "New Follower!".to_string(),
            format!("{} started following you.", name),
        ),
        NotificationKind::Message => (
            format!("New Message from {}!", name),
            "You have a new message.".to_string(),
        ),
    };

    PushMessage {
        title,
        body,
        icon: DEFAULT_ICON.to_string(),
        click_action: DEFAULT_CLICK_ACTION.to_string(),
    }
}

/// Delivers a message to one device
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> AuraResult<()>;

    fn name(&self) -> &'static str;
}

/// Last few characters of a device token, for logs
pub(crate) fn redact(token: &str) -> String {
    let tail: Vec<char> = token.chars().rev().take(6).collect();
    format!("…{}", tail.into_iter().rev().collect::<String>())
}

/// Gateway that only logs what it would have sent
#[derive(Debug, Clone, Default)]
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    async fn send(&self, token: &str, message: &PushMessage) -> AuraResult<()> {
        tracing::info!(
            token = %redact(token),
            title = %message.title,
            body = %message.body,
            "Push notification (log gateway)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Build the gateway selected in configuration
pub fn gateway_from_config(config: &PushConfig) -> AuraResult<Arc<dyn PushGateway>> {
    match config {
        PushConfig::Log => Ok(Arc::new(LogPushGateway)),
        PushConfig::Fcm {
            endpoint,
            project_id,
            credentials_file,
        } => {
            let credentials = ServiceAccountKey::from_file(credentials_file)?;
            Ok(Arc::new(FcmPushGateway::new(endpoint, project_id, credentials)?))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    /// Gateway that records every send
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<(String, PushMessage)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn send(&self, token: &str, message: &PushMessage) -> AuraResult<()> {
            self.sent
                .lock()
                .await
                .push((token.to_string(), message.clone()));
            if self.fail {
                return Err(crate::error::AuraError::Push("gateway down".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}
