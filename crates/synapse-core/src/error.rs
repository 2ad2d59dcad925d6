use thiserror::Error;

use crate::intent::IntentStatus;
use crate::types::Amount;

/// Every rejection the core can hand back to a caller. Validation failures
/// are values, never panics; invariant breaches inside the engine are
/// debug-asserted and degraded, not surfaced here.
#[derive(Debug, Error)]
pub enum SynapseError {
    // ── Intent validation ────────────────────────────────────────────────────
    #[error("intent type must be a non-empty string")]
    InvalidIntentType,

    #[error("max budget must exceed the minimum bid amount ({min} micro-USDC)")]
    BudgetTooLow { min: Amount },

    #[error("bidding duration below platform minimum ({min_ms} ms)")]
    BiddingDurationTooShort { min_ms: u64 },

    #[error("intent not found: {0}")]
    IntentNotFound(String),

    // ── Bid validation ───────────────────────────────────────────────────────
    #[error("intent is not open for bidding (status: {status})")]
    NotOpenForBidding { status: IntentStatus },

    #[error("bidding deadline has passed")]
    BiddingDeadlinePassed,

    #[error("bid amount out of range: must be within [{min}, {max}] micro-USDC")]
    BidAmountOutOfRange { min: Amount, max: Amount },

    #[error("provider reputation {actual:.2} below required {required:.2}")]
    ReputationTooLow { required: f64, actual: f64 },

    #[error("intent requires a TEE-attested provider")]
    TeeRequired,

    #[error("provider is excluded from this intent")]
    ProviderExcluded,

    #[error("provider already has a bid on this intent")]
    DuplicateBid,

    #[error("bid limit reached for this intent (max {max})")]
    TooManyBids { max: usize },

    // ── Lifecycle ────────────────────────────────────────────────────────────
    #[error("operation requires status {expected}, intent is {actual}")]
    WrongIntentStatus {
        expected: &'static str,
        actual: IntentStatus,
    },

    #[error("only the originating client may cancel an intent")]
    NotIntentOwner,

    #[error("intent cannot be cancelled in status {status}")]
    CancelNotPermitted { status: IntentStatus },

    #[error("result may only be submitted by the assigned provider")]
    WrongProvider,

    // ── Disputes ─────────────────────────────────────────────────────────────
    #[error("a dispute already exists for intent {0}")]
    DuplicateDispute(String),

    #[error("dispute not found: {0}")]
    DisputeNotFound(String),

    // ── Collaborators ────────────────────────────────────────────────────────
    #[error("escrow not found: {0}")]
    EscrowNotFound(String),

    #[error("escrow slash failed: {0}")]
    SlashFailed(String),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}
