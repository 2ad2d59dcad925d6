//! Read-only snapshot queries over the engine's intent store.

use synapse_core::intent::{Intent, IntentStatus};
use synapse_core::types::Address;

use crate::engine::IntentEngine;

impl IntentEngine {
    /// Intents still accepting bids, newest first.
    pub fn list_open_intents(&self) -> Vec<Intent> {
        let mut open: Vec<Intent> = self
            .snapshot_filtered(|i| i.status == IntentStatus::Open);
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    /// Every resident intent created by `client`, newest first. Terminal
    /// intents disappear once the retention window evicts them.
    pub fn list_intents_for_client(&self, client: &Address) -> Vec<Intent> {
        let mut owned: Vec<Intent> = self.snapshot_filtered(|i| i.client == *client);
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use synapse_core::bus::EventBus;
    use synapse_core::clock::ManualClock;
    use synapse_core::ids::SequentialIds;
    use synapse_core::intent::{CreateIntentRequest, IntentRequirements};
    use synapse_core::types::Address;

    use crate::engine::{EngineConfig, IntentEngine};

    fn request() -> CreateIntentRequest {
        CreateIntentRequest {
            intent_type: "weather.current".to_string(),
            category: "data".to_string(),
            params: json!({"city": "Lisbon"}),
            max_budget: 500_000,
            currency: "USDC".to_string(),
            requirements: IntentRequirements::default(),
            bidding_duration_ms: Some(5_000),
            execution_timeout_ms: None,
        }
    }

    #[test]
    fn open_and_per_client_listings() {
        let clock = Arc::new(ManualClock::new(1_000));
        let engine = IntentEngine::new(
            EngineConfig::default(),
            Arc::new(EventBus::new()),
            Arc::new(SequentialIds::default()),
            clock.clone(),
        );

        let alice = Address::new("0xalice");
        let bob = Address::new("0xbob");
        let a1 = engine.create_intent(request(), alice.clone()).unwrap();
        clock.advance(10);
        let b1 = engine.create_intent(request(), bob.clone()).unwrap();
        clock.advance(10);
        let a2 = engine.create_intent(request(), alice.clone()).unwrap();

        engine.force_close_bidding(&b1.id).unwrap(); // fails: no bids

        let open = engine.list_open_intents();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, a2.id, "newest first");

        let alices = engine.list_intents_for_client(&alice);
        assert_eq!(alices.len(), 2);
        assert!(alices.iter().all(|i| i.client == alice));
        assert!(engine.list_intents_for_client(&bob)[0].id == b1.id);
        let _ = a1;
    }
}
