//! The typed event surface.
//!
//! Every observable state change is one variant of [`Event`], carrying an
//! immutable snapshot of the affected entity. Components emit after their
//! critical section releases, so subscribers observe per-intent program
//! order without being able to re-enter the emitting component's lock.

use serde::{Deserialize, Serialize};

use crate::dispute::{Dispute, Evidence};
use crate::intent::{Bid, Intent};
use crate::types::{Address, Amount, DisputeId, IntentId, TimestampMs};

// ── Circuit breaker state ────────────────────────────────────────────────────

/// Shared with the safety protocol's breaker so events carry the typed state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

// ── Safety events ────────────────────────────────────────────────────────────

/// Which rate limit tripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    Count,
    Value,
}

/// State transitions and blocks raised by the payment safety gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SafetyEvent {
    Blocked { reason: String },
    Anomaly { description: String },
    RateLimit { kind: RateLimitKind },
    CircuitBreaker { state: BreakerState },
    CircularPayment { path: Vec<Address> },
    LargeTransaction { amount: Amount },
    CooldownStarted { until: TimestampMs },
    CooldownEnded,
}

// ── Marketplace events ───────────────────────────────────────────────────────

/// The exhaustive event sum. `kind()` gives the stable wire name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    IntentCreated {
        intent: Intent,
    },
    IntentUpdated {
        intent: Intent,
    },
    IntentCompleted {
        intent: Intent,
    },
    IntentFailed {
        intent: Intent,
        reason: String,
    },
    BidReceived {
        bid: Bid,
    },
    BidUpdated {
        bid: Bid,
    },
    WinnerSelected {
        intent_id: IntentId,
        bid: Bid,
    },
    FailoverTriggered {
        intent_id: IntentId,
        failed_provider: Address,
        new_provider: Address,
    },
    PaymentSettled {
        intent_id: IntentId,
        amount: Amount,
        tx_ref: String,
    },
    DisputeOpened {
        dispute: Dispute,
    },
    DisputeEvidence {
        dispute_id: DisputeId,
        evidence: Evidence,
    },
    DisputeResolved {
        dispute: Dispute,
    },
    DisputeExpired {
        dispute_id: DisputeId,
    },
    Safety(SafetyEvent),
}

impl Event {
    /// Stable colon-separated event name, for logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IntentCreated { .. } => "intent:created",
            Self::IntentUpdated { .. } => "intent:updated",
            Self::IntentCompleted { .. } => "intent:completed",
            Self::IntentFailed { .. } => "intent:failed",
            Self::BidReceived { .. } => "bid:received",
            Self::BidUpdated { .. } => "bid:updated",
            Self::WinnerSelected { .. } => "winner:selected",
            Self::FailoverTriggered { .. } => "failover:triggered",
            Self::PaymentSettled { .. } => "payment:settled",
            Self::DisputeOpened { .. } => "dispute:opened",
            Self::DisputeEvidence { .. } => "dispute:evidence",
            Self::DisputeResolved { .. } => "dispute:resolved",
            Self::DisputeExpired { .. } => "dispute:expired",
            Self::Safety(SafetyEvent::Blocked { .. }) => "safety:blocked",
            Self::Safety(SafetyEvent::Anomaly { .. }) => "safety:anomaly",
            Self::Safety(SafetyEvent::RateLimit { .. }) => "safety:rate_limit",
            Self::Safety(SafetyEvent::CircuitBreaker { .. }) => "safety:circuit_breaker",
            Self::Safety(SafetyEvent::CircularPayment { .. }) => "safety:circular_payment",
            Self::Safety(SafetyEvent::LargeTransaction { .. }) => "safety:large_transaction",
            Self::Safety(SafetyEvent::CooldownStarted { .. }) => "safety:cooldown_started",
            Self::Safety(SafetyEvent::CooldownEnded) => "safety:cooldown_ended",
        }
    }
}
