//! synapse-safety
//!
//! The agent safety protocol: a synchronous gate every candidate outgoing
//! payment passes through. Five independent checks — rate limiting, a
//! payment circuit breaker, circular-payment detection, anomaly detection,
//! and large-transaction protection — compose into one
//! [`SafetyProtocol::check_payment`] verdict.

pub mod anomaly;
pub mod circuit_breaker;
pub mod circular;
pub mod protocol;
pub mod rate_limit;

pub use anomaly::AnomalyConfig;
pub use circuit_breaker::CircuitBreakerConfig;
pub use circular::CircularDetectionConfig;
pub use protocol::{
    LargeTransactionConfig, SafetyCheckResult, SafetyConfig, SafetyProtocol, SafetyStats,
    SafetyTransaction,
};
pub use rate_limit::RateLimitConfig;
