//! Fan-out of received notifications to independent consumers.
//!
//! A [`NotificationDispatcher`] is constructed explicitly and handed to both
//! the [`ConnectionManager`](crate::manager::ConnectionManager) that feeds it
//! and the consumers that subscribe to it. Clones share one registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use notify_common::NotificationContent;
use parking_lot::RwLock;

/// Callback invoked for every dispatched notification.
///
/// Runs synchronously on the connection's receive path and must not block.
pub type NotificationCallback = Arc<dyn Fn(&NotificationContent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    /// Registration order is delivery order.
    subscribers: RwLock<Vec<(u64, NotificationCallback)>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.subscribers.write().retain(|(sid, _)| *sid != id);
    }
}

/// Ordered publish/subscribe registry of notification consumers.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    registry: Arc<Registry>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer. It stays registered until the returned
    /// [`Subscription`] is dropped or [`Subscription::unsubscribe`]d.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NotificationContent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .subscribers
            .write()
            .push((id, Arc::new(callback)));
        tracing::debug!(subscriber = id, "notification consumer subscribed");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `content` to every current subscriber, in registration order.
    ///
    /// A subscriber that panics is logged and skipped; the rest still receive
    /// the event. With no subscribers the event is dropped. Returns the number
    /// of subscribers that handled the event without panicking.
    pub fn dispatch(&self, content: &NotificationContent) -> usize {
        // Snapshot so callbacks can (un)subscribe without deadlocking.
        let subscribers: Vec<(u64, NotificationCallback)> =
            self.registry.subscribers.read().clone();

        if subscribers.is_empty() {
            tracing::debug!(kind = %content.kind, "no consumers registered, notification dropped");
            return 0;
        }

        let mut delivered = 0;
        for (id, callback) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(content))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(subscriber = id, kind = %content.kind, "notification consumer panicked");
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.read().len()
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Disposer for a dispatcher registration.
#[must_use = "dropping a Subscription unsubscribes the consumer immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
            tracing::debug!(subscriber = self.id, "notification consumer unsubscribed");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn sample(title: &str) -> NotificationContent {
        NotificationContent::new(title, "body", "info")
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&NotificationContent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &str| {
            let log = log_clone.clone();
            let name = name.to_string();
            Box::new(move |n: &NotificationContent| {
                log.lock().push(format!("{name}:{}", n.title));
            }) as Box<dyn Fn(&NotificationContent) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn delivers_to_all_subscribers_in_registration_order() {
        let dispatcher = NotificationDispatcher::new();
        let (log, make) = recorder();

        let _toast = dispatcher.subscribe(make("toast"));
        let _history = dispatcher.subscribe(make("history"));

        assert_eq!(dispatcher.dispatch(&sample("a")), 2);
        assert_eq!(dispatcher.dispatch(&sample("b")), 2);

        assert_eq!(
            *log.lock(),
            vec!["toast:a", "history:a", "toast:b", "history:b"]
        );
    }

    #[test]
    fn second_subscriber_does_not_replace_first() {
        let dispatcher = NotificationDispatcher::new();
        let (log, make) = recorder();

        let _first = dispatcher.subscribe(make("first"));
        let _second = dispatcher.subscribe(make("second"));
        dispatcher.dispatch(&sample("x"));

        assert_eq!(*log.lock(), vec!["first:x", "second:x"]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let dispatcher = NotificationDispatcher::new();
        let (log, make) = recorder();

        let keep = dispatcher.subscribe(make("keep"));
        let gone = dispatcher.subscribe(make("gone"));
        assert_eq!(dispatcher.subscriber_count(), 2);

        gone.unsubscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);
        dispatcher.dispatch(&sample("x"));

        drop(keep);
        assert_eq!(dispatcher.subscriber_count(), 0);
        dispatcher.dispatch(&sample("y"));

        assert_eq!(*log.lock(), vec!["keep:x"]);
    }

    #[test]
    fn events_without_subscribers_are_not_replayed() {
        let dispatcher = NotificationDispatcher::new();
        assert_eq!(dispatcher.dispatch(&sample("early")), 0);

        let (log, make) = recorder();
        let _late = dispatcher.subscribe(make("late"));
        assert!(log.lock().is_empty());

        dispatcher.dispatch(&sample("later"));
        assert_eq!(*log.lock(), vec!["late:later"]);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let dispatcher = NotificationDispatcher::new();
        let (log, make) = recorder();

        let _before = dispatcher.subscribe(make("before"));
        let _bad = dispatcher.subscribe(|_: &NotificationContent| panic!("render failed"));
        let _after = dispatcher.subscribe(make("after"));

        assert_eq!(dispatcher.dispatch(&sample("x")), 2);
        assert_eq!(*log.lock(), vec!["before:x", "after:x"]);
    }

    #[test]
    fn subscriber_receives_content_unmodified() {
        let dispatcher = NotificationDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let _sub = dispatcher.subscribe(move |n: &NotificationContent| {
            *seen_clone.lock() = Some(n.clone());
        });

        let content = NotificationContent::new("Low stock", "SKU-1 low", "low_stock")
            .with_data("sku", serde_json::json!("SKU-1"));
        dispatcher.dispatch(&content);
        assert_eq!(seen.lock().as_ref(), Some(&content));
    }

    #[test]
    fn callback_may_unsubscribe_during_dispatch() {
        let dispatcher = NotificationDispatcher::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let sub = dispatcher.subscribe(move |_: &NotificationContent| {
            slot_clone.lock().take();
        });
        *slot.lock() = Some(sub);

        dispatcher.dispatch(&sample("once"));
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_dispatcher_is_harmless() {
        let dispatcher = NotificationDispatcher::new();
        let sub = dispatcher.subscribe(|_: &NotificationContent| {});
        drop(dispatcher);
        drop(sub);
    }
}
