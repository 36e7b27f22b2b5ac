//! Ordered, synchronous fan-out of [`SignalEvent`]s.
//!
//! Subscribers are called in registration order on the publishing thread.
//! A subscriber that panics is logged and skipped; the rest still get the
//! event.

use relaysig_core::SignalEvent;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

type Callback = Arc<dyn Fn(&SignalEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback)>>,
}

/// Multi-subscriber event registry. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventPublisher {
    registry: Arc<Registry>,
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered until the returned handle's
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe(&self, callback: impl Fn(&SignalEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Subscribe with a channel instead of a callback.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SignalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (sub, rx)
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: &SignalEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let subscribers: Vec<(u64, Callback)> = self.lock().clone();
        for (id, callback) in subscribers {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(subscriber = id, %event, "event subscriber panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Callback)>> {
        // A poisoned list is still a valid list.
        self.registry
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle returned by [`EventPublisher::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the subscriber. Events already being delivered may still reach it.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&SignalEvent) + Send + Sync + 'static {
        let log = log.clone();
        move |event| log.lock().unwrap().push(format!("{tag}:{event}"))
    }

    #[test]
    fn delivers_in_registration_order() {
        let events = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = events.subscribe(recorder(&log, "a"));
        let _b = events.subscribe(recorder(&log, "b"));

        events.publish(&SignalEvent::Connected);
        assert_eq!(*log.lock().unwrap(), vec!["a:connected", "b:connected"]);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let events = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = events.subscribe(|_| panic!("boom"));
        let _b = events.subscribe(recorder(&log, "b"));

        events.publish(&SignalEvent::log("x"));
        events.publish(&SignalEvent::Connected);
        assert_eq!(*log.lock().unwrap(), vec!["b:log: x", "b:connected"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let events = EventPublisher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = events.subscribe(recorder(&log, "a"));
        let _b = events.subscribe(recorder(&log, "b"));
        assert_eq!(events.len(), 2);

        a.unsubscribe();
        events.publish(&SignalEvent::Connected);
        assert_eq!(*log.lock().unwrap(), vec!["b:connected"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn subscriber_may_unsubscribe_itself_during_publish() {
        let events = EventPublisher::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in = slot.clone();
        let sub = events.subscribe(move |_| {
            if let Some(sub) = slot_in.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        events.publish(&SignalEvent::Connected);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn channel_subscription() {
        let events = EventPublisher::new();
        let (_sub, mut rx) = events.subscribe_channel();
        events.publish(&SignalEvent::Offer { sdp: "v=0".into() });
        assert_eq!(rx.recv().await, Some(SignalEvent::Offer { sdp: "v=0".into() }));
    }
}
