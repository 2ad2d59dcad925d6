use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in micro-USDC (1 USDC = 1_000_000 micros). All ledger
/// arithmetic stays in integers; only the bid scorer normalises to float,
/// and its output is scaled back to an integer [`Score`] before comparison.
pub type Amount = u64;

/// Unix timestamp in milliseconds, UTC.
pub type TimestampMs = i64;

/// Fixed-point bid score: the scorer's 0..100 float scaled by 10_000,
/// so the full range is 0..=1_000_000 and comparisons are exact.
pub type Score = u32;

// ── Address ──────────────────────────────────────────────────────────────────

/// Opaque wallet address of a client or provider. The core never interprets
/// it; it is a routing key for bids, failover, and settlement.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = if self.0.len() > 10 { &self.0[..10] } else { &self.0 };
        write!(f, "Address({}…)", short)
    }
}

// ── Entity identifiers ───────────────────────────────────────────────────────

macro_rules! entity_id {
    ($name:ident, $tag:literal) => {
        /// Opaque, URL-safe identifier allocated by an [`crate::ids::IdSource`],
        #[doc = concat!("prefixed `", $tag, "_`.")]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

entity_id!(IntentId, "int");
entity_id!(BidId, "bid");
entity_id!(DisputeId, "disp");
entity_id!(EvidenceId, "evd");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_debug_is_truncated() {
        let addr = Address::new("0x1234567890abcdef");
        assert_eq!(format!("{:?}", addr), "Address(0x12345678…)");
        assert_eq!(addr.to_string(), "0x1234567890abcdef");
    }

    #[test]
    fn ids_roundtrip_serde() {
        let id = IntentId::new("int_deadbeef01020304");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"int_deadbeef01020304\"");
        let back: IntentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
