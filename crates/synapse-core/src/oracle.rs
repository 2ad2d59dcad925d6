//! Reference oracle capability.
//!
//! An oracle produces the canonical value for a typed request; the dispute
//! resolver compares it against what the provider delivered. Implementations
//! may do I/O but must return `None` on failure rather than erroring — a
//! missing reference value is handled by the resolver's null-comparand rule.

use async_trait::async_trait;
use serde_json::Value;

/// Capability returning a ground-truth value for a parameter mapping.
#[async_trait]
pub trait ReferenceOracle: Send + Sync {
    async fn get_value(&self, params: &Value) -> Option<Value>;
}

/// Oracle that always answers with a fixed value. Used for the preloaded
/// demo types and for tests that need a deterministic reference.
pub struct StaticOracle {
    value: Value,
}

impl StaticOracle {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

#[async_trait]
impl ReferenceOracle for StaticOracle {
    async fn get_value(&self, _params: &Value) -> Option<Value> {
        Some(self.value.clone())
    }
}

/// Oracle that always fails, for exercising the no-evidence path.
pub struct UnavailableOracle;

#[async_trait]
impl ReferenceOracle for UnavailableOracle {
    async fn get_value(&self, _params: &Value) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn static_oracle_echoes_its_value() {
        let oracle = StaticOracle::new(json!({"symbol": "BTC", "price": 98_500.0}));
        let value = oracle.get_value(&json!({})).await.unwrap();
        assert_eq!(value["price"], 98_500.0);
    }

    #[tokio::test]
    async fn unavailable_oracle_returns_none() {
        assert!(UnavailableOracle.get_value(&json!({})).await.is_none());
    }
}
