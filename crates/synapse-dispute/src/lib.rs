//! synapse-dispute
//!
//! Dispute resolution for the intent marketplace: evidence collection,
//! reference-oracle lookup, the deviation verdict, and escrow slashing on
//! provider fault. The oracle registry and escrow adapter are injected
//! capabilities; the resolver holds no mutable back-edge into the engine.

pub mod oracle;
pub mod query;
pub mod resolver;

pub use oracle::OracleRegistry;
pub use query::DisputeStats;
pub use resolver::{infer_intent_type, DisputeResolver, ResolverConfig};
