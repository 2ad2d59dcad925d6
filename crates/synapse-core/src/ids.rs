//! Identifier allocation.
//!
//! Ids are opaque, URL-safe, and tagged per entity (`int_`, `bid_`, `disp_`,
//! `evd_`, `tx_`). Production uses random hex; tests use a counter so
//! transcripts are deterministic.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;

/// Capability producing unique tagged identifiers.
pub trait IdSource: Send + Sync {
    /// Allocate the next id for the given tag, e.g. `next_id("int")`.
    fn next_id(&self, tag: &str) -> String;
}

/// 8 random bytes, hex-encoded: `int_3fa9c1d2e4b5a607`.
#[derive(Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self, tag: &str) -> String {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        format!("{}_{}", tag, hex::encode(bytes))
    }
}

/// Monotonic counter ids for tests: `int_0001`, `int_0002`, …
#[derive(Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl IdSource for SequentialIds {
    fn next_id(&self, tag: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{:04}", tag, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_tagged_and_distinct() {
        let ids = RandomIds;
        let a = ids.next_id("int");
        let b = ids.next_id("int");
        assert!(a.starts_with("int_"));
        assert_eq!(a.len(), "int_".len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id("bid"), "bid_0001");
        assert_eq!(ids.next_id("bid"), "bid_0002");
        assert_eq!(ids.next_id("disp"), "disp_0003");
    }
}
