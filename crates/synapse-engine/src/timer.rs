//! Deadline timers.
//!
//! One min-heap keyed on fire time serves both timer families (bidding
//! deadline, execution deadline/failover window) plus the recurring cleanup
//! tick. Cancellation never removes heap entries: each (intent, kind) key
//! carries a generation counter, and a popped entry whose generation is
//! stale is a tombstone. A single scheduler task drains the heap; per-intent
//! native OS timers are deliberately avoided.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use synapse_core::types::{IntentId, TimestampMs};

// ── Keys ─────────────────────────────────────────────────────────────────────

/// What a timer fires for. The cleanup tick is engine-global.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Bidding window closes for this intent.
    Bidding(IntentId),
    /// Execution deadline (or the shorter failover window) for this intent.
    Execution(IntentId),
    /// Periodic memory-reclamation pass.
    Cleanup,
}

// ── Heap entry ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    fire_at: TimestampMs,
    seq: u64,
    generation: u64,
    key: TimerKey,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ── TimerQueue ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Current generation per key; heap entries with an older generation
    /// are tombstones.
    generations: HashMap<TimerKey, u64>,
    /// Keys with a live (not cancelled, not fired) entry.
    armed: HashSet<TimerKey>,
    seq: u64,
}

/// Shared deadline heap with tombstone cancellation.
pub struct TimerQueue {
    state: Mutex<TimerState>,
    notify: Arc<Notify>,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState::default()),
            notify: Arc::new(Notify::new()),
        }
    }

    /// The scheduler waits on this handle; scheduling an earlier deadline
    /// wakes it.
    pub fn notify_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Arm (or re-arm) the timer for `key`. Any previously scheduled fire
    /// time for the same key becomes a tombstone.
    pub fn schedule(&self, key: TimerKey, fire_at: TimestampMs) {
        let mut state = self.state.lock();
        let generation = {
            let g = state.generations.entry(key.clone()).or_insert(0);
            *g += 1;
            *g
        };
        state.seq += 1;
        let seq = state.seq;
        state.armed.insert(key.clone());
        state.heap.push(Reverse(Entry {
            fire_at,
            seq,
            generation,
            key,
        }));
        drop(state);
        self.notify.notify_one();
    }

    /// Disarm the timer for `key`. Stale heap entries pop as tombstones and
    /// never fire a callback.
    pub fn cancel(&self, key: &TimerKey) {
        let mut state = self.state.lock();
        if state.armed.remove(key) {
            if let Some(g) = state.generations.get_mut(key) {
                *g += 1;
            }
        }
    }

    /// Earliest live deadline, discarding tombstones encountered on the way.
    pub fn next_deadline(&self) -> Option<TimestampMs> {
        let mut state = self.state.lock();
        while let Some(Reverse(entry)) = state.heap.peek() {
            let live = state.generations.get(&entry.key) == Some(&entry.generation)
                && state.armed.contains(&entry.key);
            if live {
                return Some(entry.fire_at);
            }
            state.heap.pop();
        }
        None
    }

    /// Pop every live entry due at or before `now`, in fire order.
    pub fn pop_due(&self, now: TimestampMs) -> Vec<TimerKey> {
        let mut state = self.state.lock();
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = state.heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let Reverse(entry) = state.heap.pop().expect("peeked entry");
            let live = state.generations.get(&entry.key) == Some(&entry.generation)
                && state.armed.contains(&entry.key);
            if live {
                state.armed.remove(&entry.key);
                due.push(entry.key);
            }
        }
        due
    }

    /// Number of armed timers (the monitoring gauge).
    pub fn active_count(&self) -> usize {
        self.state.lock().armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(n: u32) -> IntentId {
        IntentId::new(format!("int_{n:04}"))
    }

    #[test]
    fn fires_in_deadline_order() {
        let timers = TimerQueue::new();
        timers.schedule(TimerKey::Bidding(intent(2)), 2_000);
        timers.schedule(TimerKey::Bidding(intent(1)), 1_000);
        timers.schedule(TimerKey::Execution(intent(3)), 3_000);

        assert_eq!(timers.next_deadline(), Some(1_000));
        let due = timers.pop_due(2_500);
        assert_eq!(
            due,
            vec![TimerKey::Bidding(intent(1)), TimerKey::Bidding(intent(2))]
        );
        assert_eq!(timers.next_deadline(), Some(3_000));
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let timers = TimerQueue::new();
        timers.schedule(TimerKey::Bidding(intent(1)), 1_000);
        timers.cancel(&TimerKey::Bidding(intent(1)));

        assert_eq!(timers.next_deadline(), None);
        assert!(timers.pop_due(10_000).is_empty());
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn rescheduling_tombstones_the_old_deadline() {
        let timers = TimerQueue::new();
        let key = TimerKey::Execution(intent(1));
        timers.schedule(key.clone(), 1_000);
        timers.schedule(key.clone(), 5_000);

        assert!(timers.pop_due(2_000).is_empty(), "old deadline is stale");
        assert_eq!(timers.pop_due(5_000), vec![key]);
    }

    #[test]
    fn active_count_tracks_arming() {
        let timers = TimerQueue::new();
        timers.schedule(TimerKey::Bidding(intent(1)), 1_000);
        timers.schedule(TimerKey::Execution(intent(1)), 2_000);
        timers.schedule(TimerKey::Cleanup, 9_000);
        assert_eq!(timers.active_count(), 3);

        timers.cancel(&TimerKey::Bidding(intent(1)));
        assert_eq!(timers.active_count(), 2);

        timers.pop_due(2_000);
        assert_eq!(timers.active_count(), 1);
    }

    #[test]
    fn fired_key_can_be_rearmed() {
        let timers = TimerQueue::new();
        let key = TimerKey::Execution(intent(1));
        timers.schedule(key.clone(), 1_000);
        assert_eq!(timers.pop_due(1_000), vec![key.clone()]);

        timers.schedule(key.clone(), 2_000);
        assert_eq!(timers.pop_due(2_000), vec![key]);
    }
}
