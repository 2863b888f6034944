/// Live updates
///
/// Committed writes publish the topics they touched on a [`ChangeBus`].
/// A [`Subscription`] re-runs its query whenever one of its topics changes
/// and hands back the full, current result set.

mod subscription;

pub use subscription::Subscription;

use tokio::sync::broadcast;

/// Default number of buffered change events per receiver
const DEFAULT_CAPACITY: usize = 1024;

/// A record or query whose result may have changed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A profile document, including its counters
    Profile(String),
    /// A post document, including its counters
    Post(String),
    /// Like records of a post
    PostLikes(String),
    /// Comments of a post
    Comments(String),
    /// Outgoing follow edges of a user
    Following(String),
    /// Notifications addressed to a user
    Notifications(String),
    /// Messages of a chat
    Chat(String),
    /// Chats a user is a member of
    ChatList(String),
    /// Any story
    Stories,
}

/// In-process broadcast of change topics
#[derive(Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<Topic>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Announce that `topic` changed
    pub fn publish(&self, topic: Topic) {
        // No receivers is not an error: nobody is watching
        let _ = self.sender.send(topic);
    }

    pub fn publish_all<I>(&self, topics: I)
    where
        I: IntoIterator<Item = Topic>,
    {
        for topic in topics {
            self.publish(topic);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
