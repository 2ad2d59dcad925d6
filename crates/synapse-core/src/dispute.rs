//! Dispute data model.
//!
//! A dispute contests one completed intent (at most one per intent). The
//! resolver collects evidence, queries a reference oracle, computes a
//! deviation verdict, and on provider fault triggers an escrow slash. The
//! types here are the carried state; the adjudication logic lives in the
//! `synapse-dispute` crate.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, DisputeId, EvidenceId, IntentId, TimestampMs};

// ── Reason & status ──────────────────────────────────────────────────────────

/// Why the client contests the delivered result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    IncorrectData,
    NoResponse,
    LateResponse,
    QualityIssue,
    MaliciousBehavior,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Opened,
    EvidenceCollection,
    UnderReview,
    ResolvedClientWins,
    ResolvedProviderWins,
    ResolvedSplit,
    /// Evidence collection timed out before a verdict could be computed.
    Expired,
}

impl DisputeStatus {
    /// `resolved_at` is set iff the dispute is in one of these states.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::ResolvedClientWins | Self::ResolvedProviderWins | Self::ResolvedSplit
        )
    }
}

// ── Evidence ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSubmitter {
    Client,
    Provider,
    Oracle,
}

/// One append-only evidence entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub submitter: EvidenceSubmitter,
    /// Free-form tag, e.g. `execution_proof`, `reference_data`.
    pub evidence_type: String,
    pub payload: serde_json::Value,
    pub timestamp: TimestampMs,
}

// ── Resolution ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ClientWins,
    ProviderWins,
    Split,
}

/// Outcome of the deviation test, with the payout split it implies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Fraction of the payment refunded to the client, 0..1.
    pub client_refund: f64,
    /// Fraction of the payment released to the provider, 0..1.
    pub provider_payment: f64,
    /// Fraction of the escrow to slash (0 unless the client wins).
    pub slash_fraction: f64,
    /// Reputation penalty applied to the provider, 0..1.
    pub reputation_penalty: f64,
    pub explanation: String,
}

/// Receipt of an executed escrow slash, as reported by the escrow adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingRecord {
    /// Opaque transaction reference from the escrow layer.
    pub tx_ref: String,
    pub block_number: Option<u64>,
    pub explorer_url: Option<String>,
    pub slashed_amount: Amount,
    pub recipient: Address,
    pub executed_at: TimestampMs,
}

// ── Dispute ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    /// Contested intent; at most one dispute may exist per intent.
    pub intent_id: IntentId,
    /// Escrow backing the intent's settlement; the resolver only holds its id.
    pub escrow_id: String,
    pub client: Address,
    pub provider: Address,
    pub reason: DisputeReason,
    pub description: String,
    pub status: DisputeStatus,
    /// Append-only; entries are never mutated or removed.
    pub evidence: Vec<Evidence>,
    /// The value the provider delivered.
    pub provided_value: serde_json::Value,
    /// Ground truth, filled from the oracle (or the client's expectation).
    pub reference_value: Option<serde_json::Value>,
    /// |provided − reference| / reference × 100, when both are numeric.
    pub deviation_percent: Option<f64>,
    pub resolution: Option<Resolution>,
    pub slashing_record: Option<SlashingRecord>,
    pub created_at: TimestampMs,
    /// Set exactly once, on the transition into a resolved state.
    pub resolved_at: Option<TimestampMs>,
}

/// Request payload for `open_dispute`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenDisputeRequest {
    pub intent_id: IntentId,
    pub escrow_id: String,
    pub client: Address,
    pub provider: Address,
    pub reason: DisputeReason,
    pub description: String,
    /// Explicit intent type for oracle lookup. When absent the resolver asks
    /// the engine's read accessor, then falls back to shape inference.
    #[serde(default)]
    pub intent_type: Option<String>,
    /// The value the provider delivered.
    pub provided_value: serde_json::Value,
    /// The value the client expected, if they supplied one.
    #[serde(default)]
    pub expected_value: Option<serde_json::Value>,
}
