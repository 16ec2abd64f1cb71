//! Rolling history of recent notifications for the admin view.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify_common::NotificationContent;
use parking_lot::Mutex;
use serde::Serialize;

use crate::dispatcher::{NotificationDispatcher, Subscription};

pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub content: NotificationContent,
    /// Local receipt time; events carry no timestamp of their own.
    pub received_at: DateTime<Utc>,
}

/// The last [`HISTORY_LIMIT`] notifications, newest first. Clones share state.
#[derive(Clone, Debug)]
pub struct NotificationHistory {
    entries: Arc<Mutex<VecDeque<HistoryEntry>>>,
    limit: usize,
}

impl Default for NotificationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHistory {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit,
        }
    }

    pub fn attach(&self, dispatcher: &NotificationDispatcher) -> Subscription {
        let history = self.clone();
        dispatcher.subscribe(move |content| history.record(content))
    }

    pub fn record(&self, content: &NotificationContent) {
        let mut entries = self.entries.lock();
        entries.push_front(HistoryEntry {
            content: content.clone(),
            received_at: Utc::now(),
        });
        entries.truncate(self.limit);
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
