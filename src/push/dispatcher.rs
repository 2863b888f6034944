/// Turns a stored notification into one push delivery attempt
use super::{compose, redact, PushGateway, PushTokenStore};
use crate::{
    error::AuraResult, metrics, social::profiles::fetch_profile, social::Notification,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// What happened to a notification's push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The recipient has no registered device
    NoToken,
    /// The sender's profile is gone
    SenderMissing,
    /// The gateway rejected the message; not retried
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::NoToken => "no_token",
            DispatchOutcome::SenderMissing => "sender_missing",
            DispatchOutcome::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct PushDispatcher {
    db: SqlitePool,
    tokens: PushTokenStore,
    gateway: Arc<dyn PushGateway>,
}

impl PushDispatcher {
    pub fn new(db: SqlitePool, tokens: PushTokenStore, gateway: Arc<dyn PushGateway>) -> Self {
        Self {
            db,
            tokens,
            gateway,
        }
    }

    pub async fn dispatch(&self, notification: &Notification) -> AuraResult<DispatchOutcome> {
        let outcome = self.try_dispatch(notification).await?;
        metrics::record_push_attempt(notification.kind.as_str(), outcome.as_str());
        Ok(outcome)
    }

    async fn try_dispatch(&self, notification: &Notification) -> AuraResult<DispatchOutcome> {
        let Some(token) = self.tokens.get(&notification.recipient_id).await? else {
            tracing::debug!(
                notification_id = %notification.id,
                recipient = %notification.recipient_id,
                "No push token for recipient"
            );
            return Ok(DispatchOutcome::NoToken);
        };

        let mut conn = self.db.acquire().await?;
        let Some(sender) = fetch_profile(&mut conn, &notification.sender_id).await? else {
            tracing::debug!(
                notification_id = %notification.id,
                sender = %notification.sender_id,
                "Sender profile missing, skipping push"
            );
            return Ok(DispatchOutcome::SenderMissing);
        };
        drop(conn);

        let message = compose(notification.kind, &sender.username);

        match self.gateway.send(&token, &message).await {
            Ok(()) => {
                tracing::info!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    gateway = self.gateway.name(),
                    "Push sent"
                );
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    token = %redact(&token),
                    "Push delivery failed: {}",
                    e
                );
                Ok(DispatchOutcome::Failed)
            }
        }
    }
}
