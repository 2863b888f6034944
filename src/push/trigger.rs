/// On-create push trigger
///
/// Committed notifications go into an unbounded channel. A single worker
/// drains it and dispatches each notification once.
use super::PushDispatcher;
use crate::{metrics, social::Notification};
use tokio::{sync::mpsc, task::JoinHandle};

/// Sending half, held by the social layer
#[derive(Clone, Debug)]
pub struct NotificationOutbox {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationOutbox {
    pub fn enqueue(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::warn!(notification_id = %e.0.id, "Push trigger stopped, notification not queued");
        }
    }
}

/// Receiving half, consumed by the worker
#[derive(Debug)]
pub struct NotificationInbox {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl NotificationInbox {
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

pub fn notification_channel() -> (NotificationOutbox, NotificationInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationOutbox { tx }, NotificationInbox { rx })
}

/// Run the push worker until every outbox is dropped
pub fn spawn_trigger(dispatcher: PushDispatcher, mut inbox: NotificationInbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Push trigger started");

        while let Some(notification) = inbox.recv().await {
            match dispatcher.dispatch(&notification).await {
                Ok(outcome) => {
                    metrics::record_background_job("push_trigger", outcome.as_str());
                }
                Err(e) => {
                    metrics::record_background_job("push_trigger", "error");
                    tracing::error!(notification_id = %notification.id, "Push dispatch failed: {}", e);
                }
            }
        }

        tracing::info!("Push trigger stopped");
    })
}
