//! Payment circuit breaker.
//!
//! Closed: payments pass. A sliding window of failure timestamps trips the
//! circuit open at the threshold; while open, everything is blocked until
//! the recovery deadline passes, then exactly one payment goes through as a
//! half-open probe. Probe success closes the circuit; failure re-opens it.

use std::collections::VecDeque;

use synapse_core::events::BreakerState;
use synapse_core::types::TimestampMs;

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Failures within the window required to trip.
    pub failure_threshold: usize,
    /// Sliding failure window, seconds.
    pub failure_window_secs: u64,
    /// How long the circuit stays open before a probe is allowed, seconds.
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            failure_window_secs: 60,
            recovery_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BreakerDecision {
    Allowed,
    /// The single half-open trial payment.
    Probe,
    Blocked { retry_at: Option<TimestampMs> },
}

#[derive(Default)]
pub(crate) struct CircuitBreaker {
    state: BreakerState,
    failures: VecDeque<TimestampMs>,
    recovery_deadline: Option<TimestampMs>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Gate one payment. Returns the decision plus any state transition the
    /// check itself caused (open → half-open on deadline expiry).
    pub fn check(
        &mut self,
        now: TimestampMs,
        config: &CircuitBreakerConfig,
    ) -> (BreakerDecision, Option<BreakerState>) {
        if !config.enabled {
            return (BreakerDecision::Allowed, None);
        }
        match self.state {
            BreakerState::Closed => (BreakerDecision::Allowed, None),
            BreakerState::Open => {
                let deadline = self.recovery_deadline.unwrap_or(now);
                if now > deadline {
                    self.state = BreakerState::HalfOpen;
                    self.probe_in_flight = true;
                    (BreakerDecision::Probe, Some(BreakerState::HalfOpen))
                } else {
                    (
                        BreakerDecision::Blocked {
                            retry_at: Some(deadline),
                        },
                        None,
                    )
                }
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    // One probe at a time; everything else waits on it.
                    (BreakerDecision::Blocked { retry_at: None }, None)
                } else {
                    self.probe_in_flight = true;
                    (BreakerDecision::Probe, None)
                }
            }
        }
    }

    pub fn record_success(&mut self, now: TimestampMs, config: &CircuitBreakerConfig) -> Option<BreakerState> {
        match self.state {
            BreakerState::HalfOpen => {
                self.state = BreakerState::Closed;
                self.failures.clear();
                self.recovery_deadline = None;
                self.probe_in_flight = false;
                Some(BreakerState::Closed)
            }
            _ => {
                self.prune(now, config);
                None
            }
        }
    }

    pub fn record_failure(&mut self, now: TimestampMs, config: &CircuitBreakerConfig) -> Option<BreakerState> {
        self.failures.push_back(now);
        self.prune(now, config);
        match self.state {
            BreakerState::Closed => {
                if self.failures.len() >= config.failure_threshold {
                    self.trip(now, config);
                    Some(BreakerState::Open)
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                // The probe failed; back to open.
                self.probe_in_flight = false;
                self.trip(now, config);
                Some(BreakerState::Open)
            }
            BreakerState::Open => None,
        }
    }

    fn trip(&mut self, now: TimestampMs, config: &CircuitBreakerConfig) {
        self.state = BreakerState::Open;
        self.recovery_deadline = Some(now + (config.recovery_timeout_secs * 1_000) as i64);
    }

    fn prune(&mut self, now: TimestampMs, config: &CircuitBreakerConfig) {
        let horizon = now - (config.failure_window_secs * 1_000) as i64;
        while let Some(ts) = self.failures.front() {
            if *ts <= horizon {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            failure_window_secs: 60,
            recovery_timeout_secs: 30,
        }
    }

    #[test]
    fn trips_open_at_the_threshold() {
        let mut breaker = CircuitBreaker::default();
        let cfg = config();
        assert!(breaker.record_failure(1_000, &cfg).is_none());
        assert!(breaker.record_failure(1_001, &cfg).is_none());
        assert_eq!(breaker.record_failure(1_002, &cfg), Some(BreakerState::Open));

        let (decision, _) = breaker.check(1_003, &cfg);
        assert!(matches!(decision, BreakerDecision::Blocked { .. }));
    }

    #[test]
    fn failures_outside_the_window_do_not_count() {
        let mut breaker = CircuitBreaker::default();
        let cfg = config();
        breaker.record_failure(0, &cfg);
        breaker.record_failure(1, &cfg);
        // 61 s later the first two have aged out.
        assert!(breaker.record_failure(61_000, &cfg).is_none());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn exactly_one_probe_after_recovery() {
        let mut breaker = CircuitBreaker::default();
        let cfg = config();
        for i in 0..3 {
            breaker.record_failure(i, &cfg);
        }
        // Still blocked within the recovery timeout.
        let (decision, _) = breaker.check(10_000, &cfg);
        assert!(matches!(decision, BreakerDecision::Blocked { .. }));

        // Past the deadline: half-open, one probe.
        let (decision, transition) = breaker.check(30_003, &cfg);
        assert_eq!(decision, BreakerDecision::Probe);
        assert_eq!(transition, Some(BreakerState::HalfOpen));

        let (decision, _) = breaker.check(30_004, &cfg);
        assert!(
            matches!(decision, BreakerDecision::Blocked { .. }),
            "second payment waits on the probe"
        );
    }

    #[test]
    fn probe_success_closes_probe_failure_reopens() {
        let mut breaker = CircuitBreaker::default();
        let cfg = config();
        for i in 0..3 {
            breaker.record_failure(i, &cfg);
        }
        breaker.check(30_003, &cfg); // half-open probe out
        assert_eq!(
            breaker.record_success(30_004, &cfg),
            Some(BreakerState::Closed)
        );
        let (decision, _) = breaker.check(30_005, &cfg);
        assert_eq!(decision, BreakerDecision::Allowed);

        // Trip again and fail the probe this time.
        for i in 0..3 {
            breaker.record_failure(40_000 + i, &cfg);
        }
        breaker.check(70_005, &cfg);
        assert_eq!(
            breaker.record_failure(70_006, &cfg),
            Some(BreakerState::Open)
        );
    }

    #[test]
    fn disabled_breaker_always_allows() {
        let mut breaker = CircuitBreaker::default();
        let cfg = CircuitBreakerConfig {
            enabled: false,
            ..config()
        };
        for i in 0..10 {
            breaker.record_failure(i, &cfg);
        }
        let (decision, _) = breaker.check(20, &cfg);
        // record_failure still trips state, but a disabled breaker is never consulted.
        assert_eq!(decision, BreakerDecision::Allowed);
    }
}
