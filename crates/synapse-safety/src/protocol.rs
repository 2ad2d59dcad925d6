//! The composed payment safety gate.
//!
//! Every candidate outgoing payment passes through five independent checks;
//! a blocking check short-circuits the rest. Order: rate limit → circuit
//! breaker → circular payment → anomaly (advisory) → large-transaction
//! protection. The gate never errors: `check_payment` always returns a
//! [`SafetyCheckResult`].

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use synapse_core::bus::EventBus;
use synapse_core::clock::Clock;
use synapse_core::constants::{MICROS_PER_USDC, SAFETY_HISTORY_CAP};
use synapse_core::events::{BreakerState, Event, RateLimitKind, SafetyEvent};
use synapse_core::types::{Address, Amount, TimestampMs};

use crate::anomaly::{self, AnomalyConfig};
use crate::circuit_breaker::{BreakerDecision, CircuitBreaker, CircuitBreakerConfig};
use crate::circular::{CircularDetectionConfig, CycleProbe, PaymentGraph};
use crate::rate_limit::{RateDecision, RateLimitConfig, RateLimiter};

// ── Transaction & result ─────────────────────────────────────────────────────

/// One candidate outgoing payment, as presented to the gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyTransaction {
    pub id: String,
    pub timestamp: TimestampMs,
    pub sender: Address,
    pub recipient: Address,
    /// Micro-USDC; rate-limit accumulators stay in integers.
    pub amount: Amount,
    /// What the payment buys, e.g. `api.call`.
    pub resource: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// The gate's verdict. Never an error: blocked payments come back with
/// `allowed = false` and a reason.
#[derive(Clone, Debug, Serialize)]
pub struct SafetyCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub warnings: Vec<String>,
    /// Weighted combination of warning count, amount ratio, circuit state,
    /// and recent-activity ratio, clamped to [0, 1].
    pub risk_score: f64,
    pub recommendations: Vec<String>,
    pub requires_confirmation: bool,
    /// Imposed settlement delay for large transactions.
    pub delay_ms: u64,
}

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct LargeTransactionConfig {
    /// Amount at which the extra friction kicks in, micro-USDC.
    pub threshold: Amount,
    pub require_confirmation: bool,
    pub delay_secs: u64,
}

impl Default for LargeTransactionConfig {
    fn default() -> Self {
        Self {
            threshold: 1_000 * MICROS_PER_USDC,
            require_confirmation: true,
            delay_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SafetyConfig {
    pub rate_limit: RateLimitConfig,
    pub anomaly: AnomalyConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub circular: CircularDetectionConfig,
    pub large_transaction: LargeTransactionConfig,
}

/// Monitoring snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct SafetyStats {
    pub payments_checked: u64,
    pub payments_blocked: u64,
    pub breaker_state: BreakerState,
    pub history_len: usize,
}

// ── Protocol ─────────────────────────────────────────────────────────────────

struct SafetyInner {
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    graph: PaymentGraph,
    history: VecDeque<SafetyTransaction>,
    checked: u64,
    blocked: u64,
}

pub struct SafetyProtocol {
    config: SafetyConfig,
    inner: Mutex<SafetyInner>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl SafetyProtocol {
    pub fn new(config: SafetyConfig, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            inner: Mutex::new(SafetyInner {
                limiter: RateLimiter::default(),
                breaker: CircuitBreaker::default(),
                graph: PaymentGraph::default(),
                history: VecDeque::new(),
                checked: 0,
                blocked: 0,
            }),
            bus,
            clock,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Gate one payment. Allowed transactions are recorded into the rolling
    /// history and the payment graph; blocked ones leave no trace beyond
    /// the counters and events.
    pub fn check_payment(&self, tx: &SafetyTransaction) -> SafetyCheckResult {
        let now = self.clock.now_ms();
        let mut events: Vec<SafetyEvent> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();
        let mut block_reason: Option<String> = None;

        let result = {
            let mut inner = self.inner.lock();
            inner.checked += 1;

            // ── 1. Rate limit ─────────────────────────────────────────────────
            let rate = inner.limiter.check(now, tx.amount, &self.config.rate_limit);
            if rate.cooldown_ended {
                events.push(SafetyEvent::CooldownEnded);
            }
            match rate.decision {
                RateDecision::Allowed => {}
                RateDecision::CoolingDown { until } => {
                    block_reason = Some(format!(
                        "rate-limit cooldown active for another {} s",
                        ((until - now).max(0) + 999) / 1_000
                    ));
                    recommendations.push("wait for the cooldown to elapse".to_string());
                }
                RateDecision::LimitedByCount { until } => {
                    events.push(SafetyEvent::RateLimit {
                        kind: RateLimitKind::Count,
                    });
                    events.push(SafetyEvent::CooldownStarted { until });
                    block_reason = Some(format!(
                        "rate limit exceeded: more than {} payments in the last minute",
                        self.config.rate_limit.max_tx_per_minute
                    ));
                    recommendations.push("spread payments out over time".to_string());
                }
                RateDecision::LimitedByValue { until } => {
                    events.push(SafetyEvent::RateLimit {
                        kind: RateLimitKind::Value,
                    });
                    events.push(SafetyEvent::CooldownStarted { until });
                    block_reason = Some(format!(
                        "rate limit exceeded: more than {} micro-USDC in the last minute",
                        self.config.rate_limit.max_value_per_minute
                    ));
                    recommendations.push("split the payment across minutes".to_string());
                }
            }

            // ── 2. Circuit breaker ────────────────────────────────────────────
            if block_reason.is_none() {
                let (decision, transition) = inner.breaker.check(now, &self.config.circuit_breaker);
                if let Some(state) = transition {
                    events.push(SafetyEvent::CircuitBreaker { state });
                }
                match decision {
                    BreakerDecision::Allowed => {}
                    BreakerDecision::Probe => {
                        warnings.push(
                            "circuit breaker half-open; this payment is the recovery probe"
                                .to_string(),
                        );
                    }
                    BreakerDecision::Blocked { retry_at } => {
                        block_reason = Some(match retry_at {
                            Some(at) => format!(
                                "circuit breaker open; payments suspended for another {} s",
                                ((at - now).max(0) + 999) / 1_000
                            ),
                            None => "circuit breaker half-open; recovery probe in flight".to_string(),
                        });
                        recommendations
                            .push("investigate recent payment failures before retrying".to_string());
                    }
                }
            }

            // ── 3. Circular payments ──────────────────────────────────────────
            if block_reason.is_none() && self.config.circular.enabled {
                inner
                    .graph
                    .prune(now, (self.config.circular.time_window_secs * 1_000) as i64);
                match inner.graph.probe(&tx.sender, &tx.recipient, &self.config.circular) {
                    CycleProbe::Clear => {}
                    CycleProbe::Potential => {
                        warnings.push(
                            "recipient has previously paid the sender (potential cycle)"
                                .to_string(),
                        );
                    }
                    CycleProbe::Cycle { path } => {
                        let trace = path
                            .iter()
                            .map(Address::to_string)
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        events.push(SafetyEvent::CircularPayment { path });
                        block_reason = Some(format!("circular payment detected: {trace}"));
                        recommendations
                            .push("review the counterparties in the cycle trace".to_string());
                    }
                }
            }

            // ── 4. Anomaly detection (advisory) ───────────────────────────────
            if block_reason.is_none() {
                for signal in anomaly::analyze(&inner.history, tx, &self.config.anomaly) {
                    let description = signal.describe();
                    if signal.is_outlier() {
                        events.push(SafetyEvent::Anomaly {
                            description: description.clone(),
                        });
                    }
                    warnings.push(description);
                }
            }

            // ── 5. Large-transaction protection ───────────────────────────────
            let mut requires_confirmation = false;
            let mut delay_ms = 0;
            if block_reason.is_none() && tx.amount >= self.config.large_transaction.threshold {
                requires_confirmation = self.config.large_transaction.require_confirmation;
                delay_ms = self.config.large_transaction.delay_secs * 1_000;
                events.push(SafetyEvent::LargeTransaction { amount: tx.amount });
                warnings.push(format!(
                    "large transaction: {} micro-USDC at or above the {} threshold",
                    tx.amount, self.config.large_transaction.threshold
                ));
                if requires_confirmation {
                    recommendations.push("explicit confirmation required".to_string());
                }
            }

            let activity_ratio = inner.limiter.window_len() as f64
                / self.config.rate_limit.max_tx_per_minute.max(1) as f64;
            let risk_score = risk_score(
                warnings.len(),
                tx.amount,
                self.config.large_transaction.threshold,
                inner.breaker.state(),
                activity_ratio,
            );

            match block_reason {
                Some(reason) => {
                    inner.blocked += 1;
                    events.push(SafetyEvent::Blocked {
                        reason: reason.clone(),
                    });
                    warn!(tx_id = %tx.id, reason = %reason, "payment blocked");
                    SafetyCheckResult {
                        allowed: false,
                        reason: Some(reason),
                        warnings,
                        risk_score,
                        recommendations,
                        requires_confirmation: false,
                        delay_ms: 0,
                    }
                }
                None => {
                    inner.limiter.record(now, tx.amount);
                    inner
                        .graph
                        .record(tx.sender.clone(), tx.recipient.clone(), now);
                    inner.history.push_back(tx.clone());
                    while inner.history.len() > SAFETY_HISTORY_CAP {
                        inner.history.pop_front();
                    }
                    info!(
                        tx_id = %tx.id,
                        amount = tx.amount,
                        risk = risk_score,
                        "payment allowed"
                    );
                    SafetyCheckResult {
                        allowed: true,
                        reason: None,
                        warnings,
                        risk_score,
                        recommendations,
                        requires_confirmation,
                        delay_ms,
                    }
                }
            }
        };

        for event in events {
            self.bus.emit(&Event::Safety(event));
        }
        result
    }

    /// Report how an allowed payment actually went; feeds the circuit
    /// breaker. The only automatic retry in the core is the breaker's
    /// half-open probe.
    pub fn record_outcome(&self, success: bool) {
        let now = self.clock.now_ms();
        let transition = {
            let mut inner = self.inner.lock();
            if success {
                inner.breaker.record_success(now, &self.config.circuit_breaker)
            } else {
                inner.breaker.record_failure(now, &self.config.circuit_breaker)
            }
        };
        if let Some(state) = transition {
            if state == BreakerState::Open {
                warn!("payment circuit breaker opened");
            } else {
                info!(state = ?state, "payment circuit breaker state change");
            }
            self.bus.emit(&Event::Safety(SafetyEvent::CircuitBreaker { state }));
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.lock().breaker.state()
    }

    pub fn stats(&self) -> SafetyStats {
        let inner = self.inner.lock();
        SafetyStats {
            payments_checked: inner.checked,
            payments_blocked: inner.blocked,
            breaker_state: inner.breaker.state(),
            history_len: inner.history.len(),
        }
    }
}

/// Weighted risk combination, clamped to [0, 1].
fn risk_score(
    warning_count: usize,
    amount: Amount,
    large_threshold: Amount,
    breaker: BreakerState,
    activity_ratio: f64,
) -> f64 {
    let warning_component = (warning_count as f64 * 0.25).min(1.0);
    let amount_component = (amount as f64 / large_threshold.max(1) as f64).min(1.0);
    let circuit_component = match breaker {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 0.5,
        BreakerState::Open => 1.0,
    };
    let activity_component = activity_ratio.min(1.0);

    (0.35 * warning_component
        + 0.30 * amount_component
        + 0.20 * circuit_component
        + 0.15 * activity_component)
        .clamp(0.0, 1.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
