/// Snapshot subscriptions over the change bus
use super::{ChangeBus, Topic};
use crate::error::AuraResult;
use crate::metrics::LIVE_SUBSCRIPTIONS_ACTIVE;
use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

type Fetch<T> = Box<dyn Fn() -> BoxFuture<'static, AuraResult<T>> + Send + Sync>;

/// Live view of a query
///
/// The first call to [`Subscription::next`] yields the current snapshot.
/// Every later call waits until one of the watched topics changes and then
/// yields a freshly fetched snapshot. A receiver that fell behind simply
/// re-fetches. Dropping the subscription unsubscribes.
pub struct Subscription<T> {
    receiver: broadcast::Receiver<Topic>,
    topics: Vec<Topic>,
    fetch: Fetch<T>,
    primed: bool,
}

impl<T> Subscription<T> {
    pub fn new<F, Fut>(bus: &ChangeBus, topics: Vec<Topic>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AuraResult<T>> + Send + 'static,
        T: 'static,
    {
        // Subscribe before the first fetch so no change can slip in between
        let receiver = bus.subscribe();
        LIVE_SUBSCRIPTIONS_ACTIVE.inc();

        Self {
            receiver,
            topics,
            fetch: Box::new(move || Box::pin(fetch())),
            primed: false,
        }
    }

    /// Next snapshot, or `None` once the bus is gone
    pub async fn next(&mut self) -> Option<AuraResult<T>> {
        if !self.primed {
            self.primed = true;
            return Some((self.fetch)().await);
        }

        loop {
            match self.receiver.recv().await {
                Ok(topic) if self.topics.contains(&topic) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Live subscription lagged, re-fetching");
                    break;
                }
                Err(RecvError::Closed) => return None,
            }
        }

        self.drain_pending();
        Some((self.fetch)().await)
    }

    /// Coalesce changes that are already queued into the upcoming fetch
    fn drain_pending(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        LIVE_SUBSCRIPTIONS_ACTIVE.dec();
    }
}
