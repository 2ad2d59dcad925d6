//! End-to-end marketplace scenarios.
//!
//! Exercises the engine, resolver, and safety gate wired together the way
//! the demo binary wires them, with a manual clock and deterministic ids so
//! deadlines are collapsed explicitly instead of slept through.
//!
//! Run with:
//!   cargo test -p synapse-node --test e2e

use std::sync::{Arc, Mutex};

use serde_json::json;

use synapse_core::{
    Address, BidStatus, BidSubmission, Clock, CreateIntentRequest, DisputeReason, DisputeStatus,
    EscrowAdapter, Event, EventBus, InMemoryEscrow, IntentId, IntentReader, IntentRequirements,
    IntentStatus, ManualClock, OpenDisputeRequest, ProviderInfo, ResultSubmission, SequentialIds,
    Verdict, MICROS_PER_USDC,
};
use synapse_dispute::{DisputeResolver, OracleRegistry, ResolverConfig};
use synapse_engine::{EngineConfig, IntentEngine};
use synapse_safety::{RateLimitConfig, SafetyConfig, SafetyProtocol, SafetyTransaction};

const NOW: i64 = 1_700_000_000_000;

// ── Harness ───────────────────────────────────────────────────────────────────

struct Marketplace {
    engine: Arc<IntentEngine>,
    resolver: DisputeResolver,
    safety: SafetyProtocol,
    escrow: Arc<InMemoryEscrow>,
    clock: Arc<ManualClock>,
    events: Arc<Mutex<Vec<String>>>,
}

fn marketplace() -> Marketplace {
    let bus = Arc::new(EventBus::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe(move |e: &Event| sink.lock().unwrap().push(e.kind().to_string()));

    let clock = Arc::new(ManualClock::new(NOW));
    let ids = Arc::new(SequentialIds::default());

    let engine = IntentEngine::new(
        EngineConfig::default(),
        Arc::clone(&bus),
        ids.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    let escrow = Arc::new(InMemoryEscrow::new(Arc::clone(&clock) as Arc<dyn Clock>));
    escrow.fund("esc_main", Address::new("0xclient"), MICROS_PER_USDC);

    let resolver = DisputeResolver::new(
        ResolverConfig::default(),
        OracleRegistry::with_demo_oracles(),
        Arc::clone(&escrow) as Arc<dyn EscrowAdapter>,
        Arc::clone(&bus),
        ids.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .with_intent_reader(Arc::clone(&engine) as Arc<dyn IntentReader>);

    let safety = SafetyProtocol::new(
        SafetyConfig {
            rate_limit: RateLimitConfig {
                max_tx_per_minute: 3,
                cooldown_period_secs: 60,
                ..RateLimitConfig::default()
            },
            ..SafetyConfig::default()
        },
        bus,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    Marketplace {
        engine,
        resolver,
        safety,
        escrow,
        clock,
        events,
    }
}

fn request() -> CreateIntentRequest {
    CreateIntentRequest {
        intent_type: "crypto.price".to_string(),
        category: "data".to_string(),
        params: json!({"symbol": "BTC"}),
        max_budget: MICROS_PER_USDC,
        currency: "USDC".to_string(),
        requirements: IntentRequirements::default(),
        bidding_duration_ms: Some(5_000),
        execution_timeout_ms: Some(60_000),
    }
}

fn provider(addr: &str, reputation: f64, tee: bool) -> ProviderInfo {
    ProviderInfo {
        address: Address::new(addr),
        provider_id: format!("prov-{addr}"),
        reputation,
        tee_attested: tee,
    }
}

fn bid(intent_id: &IntentId, amount: u64, time_ms: u64, confidence: f64) -> BidSubmission {
    BidSubmission {
        intent_id: intent_id.clone(),
        amount,
        estimated_time_ms: time_ms,
        confidence,
        capabilities: vec![],
    }
}

/// Create the reference intent and its three bids, close bidding.
fn run_reference_auction(m: &Marketplace) -> IntentId {
    let intent = m
        .engine
        .create_intent(request(), Address::new("0xclient"))
        .unwrap();
    m.engine
        .submit_bid(bid(&intent.id, 600_000, 500, 0.9), provider("0xb1", 0.9, false))
        .unwrap();
    m.engine
        .submit_bid(bid(&intent.id, 800_000, 300, 0.95), provider("0xb2", 0.7, true))
        .unwrap();
    m.engine
        .submit_bid(bid(&intent.id, 500_000, 2_000, 0.6), provider("0xb3", 0.5, false))
        .unwrap();
    m.engine.force_close_bidding(&intent.id).unwrap();
    intent.id
}

fn complete(m: &Marketplace, id: &IntentId, provider_addr: &str, price: f64) {
    m.engine.mark_execution_started(id).unwrap();
    m.engine
        .submit_result(
            id,
            ResultSubmission {
                provider: Address::new(provider_addr),
                payload: json!({"symbol": "BTC", "price": price}),
                execution_time_ms: 420,
            },
        )
        .unwrap();
}

// ── Scenario 1: happy auction ─────────────────────────────────────────────────

#[tokio::test]
async fn happy_auction_selects_b1_with_score_ordered_failover_queue() {
    let m = marketplace();
    let id = run_reference_auction(&m);

    let intent = m.engine.get_intent(&id).unwrap();
    assert_eq!(intent.status, IntentStatus::Assigned);
    assert_eq!(intent.assigned_provider, Some(Address::new("0xb1")));
    assert_eq!(
        intent.failover_queue,
        vec![Address::new("0xb2"), Address::new("0xb3")]
    );

    let events = m.events.lock().unwrap();
    assert_eq!(events.iter().filter(|k| *k == "winner:selected").count(), 1);
}

// ── Scenario 2 & 3: failover, then exhaustion ─────────────────────────────────

#[tokio::test]
async fn failover_reassigns_then_exhaustion_fails() {
    let m = marketplace();
    let id = run_reference_auction(&m);

    m.engine.trigger_failover(&id).unwrap();
    let intent = m.engine.get_intent(&id).unwrap();
    assert_eq!(intent.status, IntentStatus::Assigned);
    assert_eq!(intent.assigned_provider, Some(Address::new("0xb2")));
    let b1 = m
        .engine
        .get_bids_for_intent(&id)
        .into_iter()
        .find(|b| b.provider == Address::new("0xb1"))
        .unwrap();
    assert_eq!(b1.status, BidStatus::Failed);

    m.engine.trigger_failover(&id).unwrap();
    m.engine.trigger_failover(&id).unwrap();
    let intent = m.engine.get_intent(&id).unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);
    assert_eq!(intent.failure_reason.as_deref(), Some("all providers failed"));

    let events = m.events.lock().unwrap();
    assert_eq!(events.iter().filter(|k| *k == "failover:triggered").count(), 2);
    assert_eq!(events.iter().filter(|k| *k == "intent:failed").count(), 1);
}

// ── Scenario 4: dispute resolves client-wins with slash ───────────────────────

#[tokio::test]
async fn contested_bad_price_slashes_the_provider() {
    let m = marketplace();
    let id = run_reference_auction(&m);
    complete(&m, &id, "0xb1", 80_000.0);

    let dispute = m
        .resolver
        .open_dispute(OpenDisputeRequest {
            intent_id: id.clone(),
            escrow_id: "esc_main".to_string(),
            client: Address::new("0xclient"),
            provider: Address::new("0xb1"),
            reason: DisputeReason::IncorrectData,
            description: "price far off market".to_string(),
            // No explicit type: the resolver reads it through the engine.
            intent_type: None,
            provided_value: json!({"symbol": "BTC", "price": 80_000.0}),
            expected_value: None,
        })
        .await
        .unwrap();

    assert_eq!(dispute.status, DisputeStatus::ResolvedClientWins);
    let resolution = dispute.resolution.as_ref().unwrap();
    assert_eq!(resolution.verdict, Verdict::ClientWins);
    assert_eq!(resolution.client_refund, 1.0);
    assert_eq!(resolution.slash_fraction, 0.10);
    assert!((resolution.reputation_penalty - 0.194).abs() < 0.005);

    let record = dispute.slashing_record.as_ref().unwrap();
    assert_eq!(record.slashed_amount, MICROS_PER_USDC / 10);
    assert_eq!(m.escrow.get("esc_main").await.unwrap().amount, 900_000);

    // Per-dispute event order: opened, evidence, resolved.
    let events = m.events.lock().unwrap();
    let opened = events.iter().position(|k| k == "dispute:opened").unwrap();
    let evidence = events.iter().position(|k| k == "dispute:evidence").unwrap();
    let resolved = events.iter().position(|k| k == "dispute:resolved").unwrap();
    assert!(opened < evidence && evidence < resolved);
    assert_eq!(events.iter().filter(|k| *k == "dispute:resolved").count(), 1);
}

// ── Scenario 5: dispute within tolerance ──────────────────────────────────────

#[tokio::test]
async fn contested_accurate_price_pays_the_provider() {
    let m = marketplace();
    let id = run_reference_auction(&m);
    complete(&m, &id, "0xb1", 98_700.0);

    let dispute = m
        .resolver
        .open_dispute(OpenDisputeRequest {
            intent_id: id,
            escrow_id: "esc_main".to_string(),
            client: Address::new("0xclient"),
            provider: Address::new("0xb1"),
            reason: DisputeReason::QualityIssue,
            description: "looks slightly off".to_string(),
            intent_type: None,
            provided_value: json!({"symbol": "BTC", "price": 98_700.0}),
            expected_value: None,
        })
        .await
        .unwrap();

    assert_eq!(dispute.status, DisputeStatus::ResolvedProviderWins);
    assert_eq!(
        dispute.resolution.as_ref().unwrap().reputation_penalty,
        0.0
    );
    assert!(dispute.slashing_record.is_none());
    assert_eq!(
        m.escrow.get("esc_main").await.unwrap().amount,
        MICROS_PER_USDC,
        "escrow untouched"
    );
}

// ── Scenario 6: safety rate limit ─────────────────────────────────────────────

#[tokio::test]
async fn settlement_burst_trips_the_rate_limit() {
    let m = marketplace();

    let pay = |i: u32, amount: u64| SafetyTransaction {
        id: format!("pay_{i}"),
        timestamp: m.clock.now_ms(),
        sender: Address::new("0xclient"),
        recipient: Address::new("0xb1"),
        amount,
        resource: "settlement".to_string(),
        session_id: None,
    };

    for i in 0..3 {
        assert!(m.safety.check_payment(&pay(i, MICROS_PER_USDC)).allowed);
        m.clock.advance(100);
    }
    let blocked = m.safety.check_payment(&pay(3, MICROS_PER_USDC));
    assert!(!blocked.allowed);
    assert!(blocked.reason.as_ref().unwrap().contains("rate limit"));

    // Blocked for the whole cooldown regardless of amount.
    m.clock.advance(30_000);
    assert!(!m.safety.check_payment(&pay(4, 1)).allowed);

    // A minute of quiet lifts it.
    m.clock.advance(31_000);
    assert!(m.safety.check_payment(&pay(5, MICROS_PER_USDC)).allowed);

    let events = m.events.lock().unwrap();
    assert!(events.iter().any(|k| k == "safety:rate_limit"));
    assert!(events.iter().any(|k| k == "safety:cooldown_started"));
    assert!(events.iter().any(|k| k == "safety:cooldown_ended"));
}

// ── Cross-cutting: event ordering and memory reclamation ──────────────────────

#[tokio::test]
async fn winner_selected_precedes_completion_in_program_order() {
    let m = marketplace();
    let id = run_reference_auction(&m);
    complete(&m, &id, "0xb1", 98_500.0);
    m.engine.record_payment(&id, 600_000, "tx_settle").unwrap();

    let events = m.events.lock().unwrap();
    let winner = events.iter().position(|k| k == "winner:selected").unwrap();
    let completed = events.iter().position(|k| k == "intent:completed").unwrap();
    let settled = events.iter().position(|k| k == "payment:settled").unwrap();
    assert!(winner < completed && completed < settled);
}

#[tokio::test]
async fn terminal_intents_are_evicted_after_retention() {
    let m = marketplace();
    let id = run_reference_auction(&m);
    complete(&m, &id, "0xb1", 98_500.0);

    let retention = m.engine.config().retention_period_ms as i64;
    m.clock.advance(retention + 1);
    m.engine.run_cleanup();

    assert!(m.engine.get_intent(&id).is_none());
    assert!(m.engine.get_bids_for_intent(&id).is_empty());
    assert_eq!(m.engine.stats().intents_evicted, 1);
}
