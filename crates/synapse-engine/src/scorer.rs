//! Bid scoring.
//!
//! A pure, deterministic function from (bid terms, intent terms) to a single
//! comparable scalar. Each quality dimension is normalised to [0, 1] and
//! combined with fixed weights:
//!
//!   score = 100 · (0.35·price + 0.20·time + 0.25·reputation
//!                  + 0.15·confidence + 0.05·tee)
//!
//! Price and reputation dominate; time is capped so a provider cannot win on
//! claimed speed alone; confidence is self-reported and therefore
//! rate-limited; TEE is a small tiebreaker, not a gate (gating happens in the
//! requirements check at submission). The float result is scaled by 10_000
//! into a fixed-point [`Score`] so comparisons are exact.
//!
//! No side effects, no I/O, no clock access.

use std::cmp::Ordering;

use synapse_core::intent::Bid;
use synapse_core::types::{Amount, Score};

// ── Weights ──────────────────────────────────────────────────────────────────

pub const W_PRICE: f64 = 0.35;
pub const W_TIME: f64 = 0.20;
pub const W_REPUTATION: f64 = 0.25;
pub const W_CONFIDENCE: f64 = 0.15;
pub const W_TEE: f64 = 0.05;

/// Scale from the 0..100 float score into the integer [`Score`] domain.
const SCORE_SCALE: f64 = 10_000.0;

/// Maximum representable score: 100.0 × 10_000.
pub const MAX_SCORE: Score = 1_000_000;

// ── Scoring ──────────────────────────────────────────────────────────────────

/// The bid terms the scorer reads. Deliberately a plain value type so the
/// auction is property-testable without constructing a full [`Bid`].
#[derive(Clone, Copy, Debug)]
pub struct BidQuote {
    pub amount: Amount,
    pub estimated_time_ms: u64,
    /// Self-reported completion confidence, 0..1.
    pub confidence: f64,
    /// Canonical 0..1 reputation.
    pub reputation: f64,
    pub tee_attested: bool,
}

/// Score a bid against an intent's budget and latency ceiling.
pub fn score_bid(quote: &BidQuote, max_budget: Amount, max_latency_ms: u64) -> Score {
    let price_score = if max_budget == 0 {
        0.0
    } else {
        1.0 - (quote.amount as f64 / max_budget as f64)
    };

    let latency_ceiling = max_latency_ms.max(1);
    let time_score =
        1.0 - (quote.estimated_time_ms as f64 / latency_ceiling as f64).min(1.0);

    let reputation_score = quote.reputation.clamp(0.0, 1.0);
    let confidence_score = quote.confidence.clamp(0.0, 1.0);
    let tee_score = if quote.tee_attested { 1.0 } else { 0.0 };

    let weighted = W_PRICE * price_score.clamp(0.0, 1.0)
        + W_TIME * time_score
        + W_REPUTATION * reputation_score
        + W_CONFIDENCE * confidence_score
        + W_TEE * tee_score;

    (100.0 * weighted * SCORE_SCALE).round() as Score
}

/// Total order used for ranking: score descending, then reputation
/// descending, then submission time ascending, then bid id ascending. The
/// trailing id comparison makes the order a true total order.
pub fn compare_ranked(a: &Bid, b: &Bid) -> Ordering {
    b.calculated_score
        .cmp(&a.calculated_score)
        .then_with(|| b.reputation.total_cmp(&a.reputation))
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use synapse_core::constants::{DEFAULT_MAX_LATENCY_MS, MICROS_PER_USDC};

    fn quote(amount: Amount, time_ms: u64, confidence: f64, reputation: f64, tee: bool) -> BidQuote {
        BidQuote {
            amount,
            estimated_time_ms: time_ms,
            confidence,
            reputation,
            tee_attested: tee,
        }
    }

    #[test]
    fn cheaper_bid_scores_higher_all_else_equal() {
        let budget = MICROS_PER_USDC;
        let cheap = score_bid(&quote(200_000, 500, 0.9, 0.9, false), budget, 30_000);
        let pricey = score_bid(&quote(800_000, 500, 0.9, 0.9, false), budget, 30_000);
        assert!(cheap > pricey);
    }

    #[test]
    fn time_dimension_is_capped_at_the_latency_ceiling() {
        let budget = MICROS_PER_USDC;
        let slow = score_bid(&quote(500_000, 30_000, 0.5, 0.5, false), budget, 30_000);
        let slower = score_bid(&quote(500_000, 90_000, 0.5, 0.5, false), budget, 30_000);
        assert_eq!(slow, slower, "beyond the ceiling all bids look equally slow");
    }

    #[test]
    fn tee_is_a_small_bonus() {
        let budget = MICROS_PER_USDC;
        let plain = score_bid(&quote(500_000, 500, 0.9, 0.9, false), budget, 30_000);
        let attested = score_bid(&quote(500_000, 500, 0.9, 0.9, true), budget, 30_000);
        assert!(attested > plain);
        // The TEE weight in score units: 0.05 · 100 · 10_000.
        assert_eq!(attested - plain, 50_000);
    }

    #[test]
    fn reference_auction_ordering() {
        // The three bids of the reference scenario: price and reputation
        // dominate, so B1 (0.60, rep 0.9) beats B2 (0.80, TEE) and B3 (0.50,
        // slow and weak reputation).
        let budget = MICROS_PER_USDC;
        let b1 = score_bid(&quote(600_000, 500, 0.9, 0.9, false), budget, DEFAULT_MAX_LATENCY_MS);
        let b2 = score_bid(&quote(800_000, 300, 0.95, 0.7, true), budget, DEFAULT_MAX_LATENCY_MS);
        let b3 = score_bid(&quote(500_000, 2_000, 0.6, 0.5, false), budget, DEFAULT_MAX_LATENCY_MS);
        assert!(b1 > b2, "b1={b1} b2={b2}");
        assert!(b2 > b3, "b2={b2} b3={b3}");
    }

    proptest! {
        #[test]
        fn score_is_bounded(
            amount in 0u64..=MICROS_PER_USDC,
            time_ms in 0u64..120_000,
            confidence in 0.0f64..=1.0,
            reputation in 0.0f64..=1.0,
            tee in any::<bool>(),
        ) {
            let s = score_bid(
                &quote(amount, time_ms, confidence, reputation, tee),
                MICROS_PER_USDC,
                DEFAULT_MAX_LATENCY_MS,
            );
            prop_assert!(s <= MAX_SCORE);
        }

        #[test]
        fn score_is_monotone_in_price(
            amount in 0u64..MICROS_PER_USDC,
            delta in 1u64..100_000,
            time_ms in 0u64..30_000,
            confidence in 0.0f64..=1.0,
            reputation in 0.0f64..=1.0,
        ) {
            let budget = MICROS_PER_USDC + 100_000;
            let lower = score_bid(&quote(amount, time_ms, confidence, reputation, false), budget, DEFAULT_MAX_LATENCY_MS);
            let higher = score_bid(&quote(amount + delta, time_ms, confidence, reputation, false), budget, DEFAULT_MAX_LATENCY_MS);
            prop_assert!(lower >= higher);
        }

        #[test]
        fn score_is_deterministic(
            amount in 0u64..=MICROS_PER_USDC,
            time_ms in 0u64..120_000,
            confidence in 0.0f64..=1.0,
            reputation in 0.0f64..=1.0,
            tee in any::<bool>(),
        ) {
            let q = quote(amount, time_ms, confidence, reputation, tee);
            let a = score_bid(&q, MICROS_PER_USDC, DEFAULT_MAX_LATENCY_MS);
            let b = score_bid(&q, MICROS_PER_USDC, DEFAULT_MAX_LATENCY_MS);
            prop_assert_eq!(a, b);
        }
    }
}
