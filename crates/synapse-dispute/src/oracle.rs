//! Reference oracle registry.
//!
//! Maps an intent type string to the capability that can produce a reference
//! value for it. Two demo types are preloaded; anything else is registered at
//! runtime. Lookups clone the capability handle out of the lock so oracle
//! I/O never happens under it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use synapse_core::oracle::{ReferenceOracle, StaticOracle};

#[derive(Default)]
pub struct OracleRegistry {
    entries: RwLock<HashMap<String, Arc<dyn ReferenceOracle>>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with deterministic capabilities for the demo
    /// types, so the marketplace runs end-to-end with no network.
    pub fn with_demo_oracles() -> Self {
        let registry = Self::new();
        registry.register(
            "crypto.price",
            Arc::new(StaticOracle::new(json!({"symbol": "BTC", "price": 98_500.0}))),
        );
        registry.register(
            "weather.current",
            Arc::new(StaticOracle::new(json!({"city": "Lisbon", "temperature": 22.5}))),
        );
        registry
    }

    /// Register (or replace) the capability for an intent type.
    pub fn register(&self, intent_type: impl Into<String>, oracle: Arc<dyn ReferenceOracle>) {
        self.entries.write().insert(intent_type.into(), oracle);
    }

    pub fn get(&self, intent_type: &str) -> Option<Arc<dyn ReferenceOracle>> {
        self.entries.read().get(intent_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.read().keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::oracle::UnavailableOracle;

    #[test]
    fn demo_registry_preloads_both_types() {
        let registry = OracleRegistry::with_demo_oracles();
        assert_eq!(
            registry.registered_types(),
            vec!["crypto.price".to_string(), "weather.current".to_string()]
        );
        assert!(registry.get("crypto.price").is_some());
        assert!(registry.get("news.headlines").is_none());
    }

    #[tokio::test]
    async fn runtime_registration_replaces() {
        let registry = OracleRegistry::with_demo_oracles();
        registry.register("crypto.price", Arc::new(UnavailableOracle));
        let oracle = registry.get("crypto.price").unwrap();
        assert!(oracle.get_value(&json!({})).await.is_none());
    }
}
