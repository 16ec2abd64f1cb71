//! Broadcast hub for fanning notifications out to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters payloads locally by [`Target`].

use std::sync::Arc;

use notify_common::NotificationContent;
use tokio::sync::broadcast;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BROADCAST_CAPACITY: usize = 4096;

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    /// Connections that joined the named group.
    Group(String),
    /// Every connection authenticated as this user id.
    User(String),
}

/// A notification on its way to matching sessions.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub target: Target,
    pub content: NotificationContent,
}

/// The process-wide fan-out hub, held in AppState.
#[derive(Clone)]
pub struct NotificationBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl Default for NotificationBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Each session calls this once, before it sends READY.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    pub fn dispatch(&self, target: Target, content: NotificationContent) {
        tracing::debug!(?target, kind = %content.kind, "dispatching notification");
        // Err only means nobody is listening.
        let _ = self.sender.send(Arc::new(BroadcastPayload { target, content }));
    }
}
