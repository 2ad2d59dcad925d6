//! Anomaly detection over the rolling payment history.
//!
//! Advisory only: anomalies contribute warnings and risk, they never block
//! on their own. The statistical flag needs a minimum sample size before it
//! speaks; the remaining signals are heuristics over the recent history.

use std::collections::VecDeque;

use chrono::{TimeZone, Timelike};

use crate::protocol::SafetyTransaction;

/// How far back "recent" reaches for the repeated-recipient signal.
const RECENT_WINDOW_MS: i64 = 3_600_000;

#[derive(Clone, Debug)]
pub struct AnomalyConfig {
    pub enabled: bool,
    /// Scales the statistical threshold: higher sensitivity flags earlier.
    pub sensitivity: f64,
    /// Samples required before the mean/σ flag activates.
    pub min_transactions: usize,
    /// Standard deviations from the mean that flag an amount.
    pub std_dev_threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: 1.0,
            min_transactions: 5,
            std_dev_threshold: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AnomalySignal {
    AmountOutlier { z_score: f64 },
    UnusualHour { hour: u32 },
    FirstTimeRecipient,
    RepeatedRecipient { count: usize },
}

impl AnomalySignal {
    pub fn describe(&self) -> String {
        match self {
            Self::AmountOutlier { z_score } => {
                format!("amount is {z_score:.1} standard deviations from the rolling mean")
            }
            Self::UnusualHour { hour } => {
                format!("payment at an unusual local hour ({hour:02}:00)")
            }
            Self::FirstTimeRecipient => "first payment to this recipient".to_string(),
            Self::RepeatedRecipient { count } => {
                format!("{count} recent payments to the same recipient")
            }
        }
    }

    pub fn is_outlier(&self) -> bool {
        matches!(self, Self::AmountOutlier { .. })
    }
}

pub(crate) fn analyze(
    history: &VecDeque<SafetyTransaction>,
    tx: &SafetyTransaction,
    config: &AnomalyConfig,
) -> Vec<AnomalySignal> {
    if !config.enabled {
        return Vec::new();
    }
    let mut signals = Vec::new();

    if history.len() >= config.min_transactions {
        let n = history.len() as f64;
        let mean = history.iter().map(|t| t.amount as f64).sum::<f64>() / n;
        let variance = history
            .iter()
            .map(|t| {
                let d = t.amount as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();
        if std_dev > f64::EPSILON {
            let z_score = (tx.amount as f64 - mean).abs() / std_dev;
            let threshold = config.std_dev_threshold / config.sensitivity.max(f64::EPSILON);
            if z_score > threshold {
                signals.push(AnomalySignal::AmountOutlier { z_score });
            }
        }
    }

    if let Some(local) = chrono::Local.timestamp_millis_opt(tx.timestamp).single() {
        let hour = local.hour();
        if (2..5).contains(&hour) {
            signals.push(AnomalySignal::UnusualHour { hour });
        }
    }

    let to_recipient = history
        .iter()
        .filter(|t| t.recipient == tx.recipient)
        .count();
    if to_recipient == 0 {
        signals.push(AnomalySignal::FirstTimeRecipient);
    } else {
        let recent = history
            .iter()
            .filter(|t| t.recipient == tx.recipient && t.timestamp + RECENT_WINDOW_MS > tx.timestamp)
            .count();
        if recent >= 3 {
            signals.push(AnomalySignal::RepeatedRecipient { count: recent });
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::types::Address;

    fn tx(id: &str, recipient: &str, amount: u64, timestamp: i64) -> SafetyTransaction {
        SafetyTransaction {
            id: id.to_string(),
            timestamp,
            sender: Address::new("0xagent"),
            recipient: Address::new(recipient),
            amount,
            resource: "api.call".to_string(),
            session_id: None,
        }
    }

    fn seeded_history() -> VecDeque<SafetyTransaction> {
        // Slightly varied amounts around 1 USDC so σ is non-zero.
        [1_000_000u64, 1_100_000, 900_000, 1_050_000, 950_000]
            .iter()
            .enumerate()
            .map(|(i, a)| tx(&format!("tx{i}"), "0xknown", *a, 1_000 + i as i64))
            .collect()
    }

    #[test]
    fn outlier_amount_is_flagged_after_min_samples() {
        let history = seeded_history();
        let signals = analyze(
            &history,
            &tx("big", "0xknown", 100_000_000, 2_000),
            &AnomalyConfig::default(),
        );
        assert!(signals.iter().any(|s| s.is_outlier()));
    }

    #[test]
    fn small_history_stays_silent_on_amounts() {
        let mut history = seeded_history();
        history.truncate(3);
        let signals = analyze(
            &history,
            &tx("big", "0xknown", 100_000_000, 2_000),
            &AnomalyConfig::default(),
        );
        assert!(!signals.iter().any(|s| s.is_outlier()));
    }

    #[test]
    fn first_time_recipient_is_advisory() {
        let history = seeded_history();
        let signals = analyze(
            &history,
            &tx("new", "0xnever_seen", 1_000_000, 2_000),
            &AnomalyConfig::default(),
        );
        assert!(signals.contains(&AnomalySignal::FirstTimeRecipient));
    }

    #[test]
    fn repeated_recipient_needs_three_recent() {
        let history = seeded_history();
        let signals = analyze(
            &history,
            &tx("again", "0xknown", 1_000_000, 2_000),
            &AnomalyConfig::default(),
        );
        assert!(signals
            .iter()
            .any(|s| matches!(s, AnomalySignal::RepeatedRecipient { count } if *count == 5)));
    }

    #[test]
    fn disabled_detector_is_silent() {
        let history = seeded_history();
        let signals = analyze(
            &history,
            &tx("big", "0xnever_seen", 100_000_000, 2_000),
            &AnomalyConfig {
                enabled: false,
                ..AnomalyConfig::default()
            },
        );
        assert!(signals.is_empty());
    }
}
