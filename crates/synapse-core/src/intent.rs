//! Core marketplace types: intents and the bids competing for them.
//!
//! An [`Intent`] is a client's advertised unit of work with a budget and
//! requirements; a [`Bid`] is a provider's priced offer to fulfil it. The
//! intent engine owns both exclusively — everything here is plain data with
//! serde derives so events can carry immutable snapshots.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, BidId, IntentId, Score, TimestampMs};

// ── Intent status ────────────────────────────────────────────────────────────

/// Lifecycle of an intent. Transitions are monotone except that `Assigned`
/// recurs on failover (the next provider is assigned before executing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Open,
    BiddingClosed,
    Assigned,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl IntentStatus {
    /// Terminal states are retained for the retention window, then evicted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::BiddingClosed => "bidding_closed",
            Self::Assigned => "assigned",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

// ── Requirements ─────────────────────────────────────────────────────────────

/// Provider requirements attached to an intent. All gates are checked at
/// bid submission; the scorer only rewards, never gates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentRequirements {
    /// Minimum provider reputation in the canonical 0..1 domain.
    #[serde(default)]
    pub min_reputation: f64,
    /// Whether the provider must present a TEE attestation.
    #[serde(default)]
    pub require_tee: bool,
    #[serde(default)]
    pub preferred_providers: Vec<Address>,
    #[serde(default)]
    pub excluded_providers: Vec<Address>,
    /// Maximum tolerated execution latency; also the scorer's time ceiling.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
}

impl Default for IntentRequirements {
    fn default() -> Self {
        Self {
            min_reputation: 0.0,
            require_tee: false,
            preferred_providers: Vec::new(),
            excluded_providers: Vec::new(),
            max_latency_ms: None,
        }
    }
}

// ── Intent ───────────────────────────────────────────────────────────────────

/// Result recorded when the assigned provider delivers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    /// Stable id of the delivering provider (not the wallet address).
    pub provider_id: String,
    /// Opaque payload returned by the provider.
    pub payload: serde_json::Value,
    pub execution_time_ms: u64,
    /// Settlement fields, written by `record_payment` after completion.
    pub settled_amount: Option<Amount>,
    pub settlement_tx: Option<String>,
    pub completed_at: TimestampMs,
}

/// A client's advertised unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    /// Originating client wallet; the only address allowed to cancel.
    pub client: Address,
    /// Free-form type string, e.g. `crypto.price` or `weather.current`.
    pub intent_type: String,
    /// Coarse category for discovery, e.g. `data` or `compute`.
    pub category: String,
    /// Opaque parameters forwarded to the winning provider.
    pub params: serde_json::Value,
    /// Maximum the client will pay, micro-USDC.
    pub max_budget: Amount,
    pub currency: String,
    pub requirements: IntentRequirements,
    pub created_at: TimestampMs,
    /// created_at + bidding window.
    pub bidding_deadline: TimestampMs,
    /// bidding_deadline + execution timeout.
    pub execution_deadline: TimestampMs,
    pub status: IntentStatus,
    /// Wallet of the currently assigned provider, if any.
    pub assigned_provider: Option<Address>,
    /// Runner-up provider wallets in score-descending order.
    pub failover_queue: Vec<Address>,
    pub result: Option<IntentResult>,
    /// Set when status becomes `Failed` ("no bids received", …).
    pub failure_reason: Option<String>,
    /// When the intent entered a terminal state; drives retention eviction.
    pub terminal_at: Option<TimestampMs>,
}

/// Request payload for `create_intent`. Unset windows fall back to the
/// engine's configured defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    pub intent_type: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    pub max_budget: Amount,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub requirements: IntentRequirements,
    #[serde(default)]
    pub bidding_duration_ms: Option<u64>,
    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,
}

fn default_category() -> String {
    "data".to_string()
}

fn default_currency() -> String {
    "USDC".to_string()
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// ── Bid status ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Submitted, auction still open.
    Pending,
    /// Selected as the winner; at most one per intent.
    Accepted,
    /// Runner-up queued for failover.
    Failover,
    /// The winning bid of a completed intent.
    Executed,
    /// Provider missed their execution window or was skipped.
    Failed,
}

// ── Bid ──────────────────────────────────────────────────────────────────────

/// A provider's priced offer on an intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub intent_id: IntentId,
    /// Provider wallet used for assignment and settlement.
    pub provider: Address,
    /// Stable provider identity (registry key), distinct from the wallet.
    pub provider_id: String,
    /// Offered price; within [MIN_BID_AMOUNT, intent.max_budget].
    pub amount: Amount,
    pub estimated_time_ms: u64,
    /// Self-reported completion confidence in 0..1.
    pub confidence: f64,
    /// Provider reputation snapshotted at submission, canonical 0..1 domain.
    pub reputation: f64,
    pub tee_attested: bool,
    pub capabilities: Vec<String>,
    /// Assigned by the scorer at submission.
    pub calculated_score: Score,
    /// 1-based rank among the intent's bids; re-derived on every insert.
    pub rank: u32,
    pub submitted_at: TimestampMs,
    /// Bids expire with the intent's execution deadline.
    pub expires_at: TimestampMs,
    pub status: BidStatus,
}

/// Request payload for `submit_bid`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidSubmission {
    pub intent_id: IntentId,
    pub amount: Amount,
    pub estimated_time_ms: u64,
    pub confidence: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Request payload for `submit_result`. Only the currently assigned
/// provider's submission is accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub provider: Address,
    pub payload: serde_json::Value,
    pub execution_time_ms: u64,
}

/// Provider identity presented alongside a bid submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub address: Address,
    pub provider_id: String,
    /// Raw reputation as reported by the registry. Two conventions exist in
    /// the wild (0..1 and 0..5); `normalized_reputation` folds both to 0..1.
    pub reputation: f64,
    pub tee_attested: bool,
}

impl ProviderInfo {
    /// Canonical 0..1 reputation. Values above 1.0 are treated as the 0..5
    /// star convention and divided by 5; the result is clamped to [0, 1].
    pub fn normalized_reputation(&self) -> f64 {
        let rep = if self.reputation > 1.0 {
            self.reputation / 5.0
        } else {
            self.reputation
        };
        rep.clamp(0.0, 1.0)
    }
}

// ── Read-only engine access ──────────────────────────────────────────────────

/// Narrow read capability over the intent store. The dispute resolver uses
/// this to enrich disputes without holding a back-edge into the engine.
pub trait IntentReader: Send + Sync {
    fn intent_snapshot(&self, id: &IntentId) -> Option<Intent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(IntentStatus::Completed.is_terminal());
        assert!(IntentStatus::Failed.is_terminal());
        assert!(IntentStatus::Cancelled.is_terminal());
        assert!(!IntentStatus::Open.is_terminal());
        assert!(!IntentStatus::Assigned.is_terminal());
    }

    #[test]
    fn reputation_normalisation_folds_both_conventions() {
        let five_star = ProviderInfo {
            address: Address::new("0xaaa"),
            provider_id: "prov-1".into(),
            reputation: 4.5,
            tee_attested: false,
        };
        assert!((five_star.normalized_reputation() - 0.9).abs() < 1e-9);

        let unit = ProviderInfo {
            address: Address::new("0xbbb"),
            provider_id: "prov-2".into(),
            reputation: 0.8,
            tee_attested: false,
        };
        assert!((unit.normalized_reputation() - 0.8).abs() < 1e-9);

        let wild = ProviderInfo {
            address: Address::new("0xccc"),
            provider_id: "prov-3".into(),
            reputation: 9.0,
            tee_attested: false,
        };
        assert!((wild.normalized_reputation() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn create_request_defaults_fill_in() {
        let req: CreateIntentRequest = serde_json::from_str(
            r#"{"intent_type": "crypto.price", "max_budget": 500000}"#,
        )
        .unwrap();
        assert_eq!(req.category, "data");
        assert_eq!(req.currency, "USDC");
        assert!(req.requirements.excluded_providers.is_empty());
        assert!(req.bidding_duration_ms.is_none());
    }
}
