//! In-process publish/subscribe for [`Event`].
//!
//! Subscribers run synchronously on the emitting thread, after the emitter
//! has released its own lock. A panicking subscriber is isolated so the
//! remaining subscribers still observe the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::events::Event;

/// Handle returned by [`EventBus::subscribe`]; pass back to unsubscribe.
pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Synchronous event dispatcher. Cheap to share behind an `Arc`; the
/// subscriber list is read-locked only long enough to clone the handles.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. The callback must not block: it runs inline on
    /// whichever thread emits.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(f)));
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|(sid, _)| *sid != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Dispatch to every subscriber in registration order. A panic in one
    /// subscriber is caught and logged; the rest still run.
    pub fn emit(&self, event: &Event) {
        let handlers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(kind = event.kind(), "event subscriber panicked; isolated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SafetyEvent;
    use std::sync::atomic::AtomicUsize;

    fn probe_event() -> Event {
        Event::Safety(SafetyEvent::CooldownEnded)
    }

    #[test]
    fn subscribers_observe_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let s1 = Arc::clone(&seen);
        bus.subscribe(move |_| {
            s1.fetch_add(1, Ordering::SeqCst);
        });
        let s2 = Arc::clone(&seen);
        bus.subscribe(move |_| {
            s2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&probe_event());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let id = bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&probe_event());
        bus.unsubscribe(id);
        bus.emit(&probe_event());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("misbehaving observer"));
        let s = Arc::clone(&seen);
        bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&probe_event());
        assert_eq!(seen.load(Ordering::SeqCst), 1, "later subscriber still ran");
    }
}
