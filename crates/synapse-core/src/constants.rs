//! ─── Synapse protocol constants ─────────────────────────────────────────────
//!
//! "An in-process coordination fabric for the intent marketplace."
//!
//! Money convention: six-decimal fixed point, the USDC base-unit convention
//! (1 USDC = 1_000_000 micros). Every default below can be overridden through
//! the per-component configuration structs.

use crate::types::Amount;

// ── Money ────────────────────────────────────────────────────────────────────

/// 1 USDC expressed in micro-USDC.
pub const MICROS_PER_USDC: Amount = 1_000_000;

/// Global floor for any bid amount: $0.01.
pub const MIN_BID_AMOUNT: Amount = 10_000;

// ── Auction windows ──────────────────────────────────────────────────────────

/// Platform minimum bidding window. Requests below this are rejected.
pub const MIN_BIDDING_DURATION_MS: u64 = 1_000;

/// Default bidding window when the request does not specify one.
pub const DEFAULT_BIDDING_DURATION_MS: u64 = 30_000;

/// Default overall execution timeout, measured from bidding close.
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 60_000;

/// Window an assigned provider has to pick the job up before failover.
pub const FAILOVER_TIMEOUT_MS: u64 = 10_000;

/// Latency normalisation ceiling used by the scorer when the intent does not
/// declare `max_latency_ms`.
pub const DEFAULT_MAX_LATENCY_MS: u64 = 30_000;

// ── Engine memory reclamation ────────────────────────────────────────────────

/// How long terminal intents are retained before eviction. Default: 1 hour.
pub const RETENTION_PERIOD_MS: u64 = 3_600_000;

/// Interval between cleanup passes. Default: 5 minutes.
pub const CLEANUP_INTERVAL_MS: u64 = 300_000;

/// Hard cap on resident intents; oldest terminal intents are evicted first.
pub const MAX_INTENTS: usize = 10_000;

/// Hard cap on bids per intent.
pub const MAX_BIDS_PER_INTENT: usize = 100;

// ── Dispute resolution ───────────────────────────────────────────────────────

/// Relative deviation above which the provider is at fault. Default: 5%.
pub const DEFAULT_DEVIATION_THRESHOLD: f64 = 0.05;

/// Fraction of the escrow slashed on a client-wins verdict. Default: 10%.
pub const DEFAULT_SLASH_PERCENTAGE: f64 = 0.10;

/// Bounds for the reputation penalty applied on provider fault.
pub const MIN_REPUTATION_PENALTY: f64 = 0.1;
pub const MAX_REPUTATION_PENALTY: f64 = 0.5;

/// How long a dispute may sit unresolved collecting evidence. Default: 5 min.
pub const EVIDENCE_TIMEOUT_MS: u64 = 300_000;

// ── Safety protocol ──────────────────────────────────────────────────────────

/// Hard cap on the safety protocol's rolling transaction history.
pub const SAFETY_HISTORY_CAP: usize = 500;
