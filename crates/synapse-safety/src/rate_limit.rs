//! Sliding-window rate limiting with cooldown.
//!
//! One bucket covers the agent's outgoing payments over the last 60 seconds,
//! by count and by cumulative value. Value accumulates in integer micro-USDC.
//! Tripping either limit starts a cooldown during which every payment is
//! blocked regardless of amount.

use std::collections::VecDeque;

use synapse_core::constants::MICROS_PER_USDC;
use synapse_core::types::{Amount, TimestampMs};

const WINDOW_MS: i64 = 60_000;

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max_tx_per_minute: usize,
    /// Cumulative value ceiling over the window, micro-USDC.
    pub max_value_per_minute: Amount,
    /// Cooldown length after a trip, seconds.
    pub cooldown_period_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tx_per_minute: 10,
            max_value_per_minute: 100 * MICROS_PER_USDC,
            cooldown_period_secs: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RateDecision {
    Allowed,
    LimitedByCount { until: TimestampMs },
    LimitedByValue { until: TimestampMs },
    CoolingDown { until: TimestampMs },
}

pub(crate) struct RateCheck {
    pub decision: RateDecision,
    /// True when this check observed the cooldown elapse.
    pub cooldown_ended: bool,
}

#[derive(Default)]
pub(crate) struct RateLimiter {
    window: VecDeque<(TimestampMs, Amount)>,
    cooldown_until: Option<TimestampMs>,
}

impl RateLimiter {
    pub fn check(&mut self, now: TimestampMs, amount: Amount, config: &RateLimitConfig) -> RateCheck {
        let mut cooldown_ended = false;
        if let Some(until) = self.cooldown_until {
            if now < until {
                return RateCheck {
                    decision: RateDecision::CoolingDown { until },
                    cooldown_ended: false,
                };
            }
            self.cooldown_until = None;
            cooldown_ended = true;
        }

        while let Some((ts, _)) = self.window.front() {
            if *ts <= now - WINDOW_MS {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= config.max_tx_per_minute {
            let until = self.trip(now, config);
            return RateCheck {
                decision: RateDecision::LimitedByCount { until },
                cooldown_ended,
            };
        }

        let windowed: u128 = self.window.iter().map(|(_, a)| *a as u128).sum();
        if windowed + amount as u128 > config.max_value_per_minute as u128 {
            let until = self.trip(now, config);
            return RateCheck {
                decision: RateDecision::LimitedByValue { until },
                cooldown_ended,
            };
        }

        RateCheck {
            decision: RateDecision::Allowed,
            cooldown_ended,
        }
    }

    /// Record an allowed payment into the window.
    pub fn record(&mut self, now: TimestampMs, amount: Amount) {
        self.window.push_back((now, amount));
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn trip(&mut self, now: TimestampMs, config: &RateLimitConfig) -> TimestampMs {
        let until = now + (config.cooldown_period_secs * 1_000) as i64;
        self.cooldown_until = Some(until);
        until
    }
}
