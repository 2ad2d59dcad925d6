//! Wall-clock capability.
//!
//! Components never call the system clock directly; they hold a `Clock` so
//! tests can drive deadlines without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::TimestampMs;

/// Monotonic-enough millisecond wall time.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> TimestampMs;
}

/// The real clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-cranked clock for tests.
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: TimestampMs) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: TimestampMs) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}
