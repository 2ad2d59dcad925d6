//! synapse-node — scripted marketplace demo.
//!
//! Wires the three services together the way an embedding process would:
//!   1. One event bus, one clock, one id source
//!   2. Intent engine with its scheduler task
//!   3. Dispute resolver over the demo oracle registry and an in-memory escrow
//!   4. Safety gate in front of every outgoing payment
//! then runs a chosen scenario end to end and prints the statistics.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::info;

use synapse_core::{
    Address, BidSubmission, Clock, CreateIntentRequest, DisputeReason, EscrowAdapter, EventBus,
    InMemoryEscrow, IntentReader, IntentRequirements, OpenDisputeRequest, ProviderInfo, RandomIds,
    ResultSubmission, SystemClock, MICROS_PER_USDC,
};
use synapse_dispute::{DisputeResolver, OracleRegistry, ResolverConfig};
use synapse_engine::{EngineConfig, IntentEngine};
use synapse_safety::{SafetyConfig, SafetyProtocol, SafetyTransaction};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Happy-path auction: three bids, winner, completion, settlement.
    Auction,
    /// Winner misses the pickup window; the runner-up delivers.
    Failover,
    /// Completed intent is contested and slashed.
    Dispute,
    /// The safety gate trips its rate limit.
    Safety,
    /// All of the above, in order.
    All,
}

#[derive(Parser, Debug)]
#[command(
    name = "synapse-node",
    version,
    about = "Synapse marketplace demo — intents, bids, disputes, payment safety"
)]
struct Args {
    /// Which scripted scenario to run.
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Bidding window for demo intents, milliseconds.
    #[arg(long, default_value_t = 1_500)]
    bidding_ms: u64,

    /// Print every bus event as one JSON line.
    #[arg(long)]
    json_events: bool,
}

struct Services {
    engine: Arc<IntentEngine>,
    resolver: DisputeResolver,
    safety: SafetyProtocol,
    escrow: Arc<InMemoryEscrow>,
}

fn build_services(args: &Args) -> Services {
    let bus = Arc::new(EventBus::new());
    let ids = Arc::new(RandomIds);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if args.json_events {
        bus.subscribe(|event| {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
        });
    } else {
        bus.subscribe(|event| info!(kind = event.kind(), "event"));
    }

    let engine = IntentEngine::new(
        EngineConfig::default(),
        Arc::clone(&bus),
        ids.clone(),
        Arc::clone(&clock),
    );
    // Detached on purpose: the task holds only a Weak handle and exits
    // with the engine.
    let _ = engine.spawn_scheduler();

    let escrow = Arc::new(InMemoryEscrow::new(Arc::clone(&clock)));
    let resolver = DisputeResolver::new(
        ResolverConfig::default(),
        OracleRegistry::with_demo_oracles(),
        Arc::clone(&escrow) as Arc<dyn EscrowAdapter>,
        Arc::clone(&bus),
        ids.clone(),
        Arc::clone(&clock),
    )
    .with_intent_reader(Arc::clone(&engine) as Arc<dyn IntentReader>);

    let safety = SafetyProtocol::new(SafetyConfig::default(), bus, clock);

    Services {
        engine,
        resolver,
        safety,
        escrow,
    }
}

fn demo_request(bidding_ms: u64) -> CreateIntentRequest {
    CreateIntentRequest {
        intent_type: "crypto.price".to_string(),
        category: "data".to_string(),
        params: json!({"symbol": "BTC"}),
        max_budget: MICROS_PER_USDC,
        currency: "USDC".to_string(),
        requirements: IntentRequirements::default(),
        bidding_duration_ms: Some(bidding_ms),
        execution_timeout_ms: Some(30_000),
    }
}

fn provider(addr: &str, reputation: f64, tee: bool) -> ProviderInfo {
    ProviderInfo {
        address: Address::new(addr),
        provider_id: format!("prov-{}", &addr[2..]),
        reputation,
        tee_attested: tee,
    }
}

/// Run one auction through settlement; returns the completed intent id and
/// the winning provider address.
fn run_auction(services: &Services, args: &Args, price: f64) -> anyhow::Result<(synapse_core::IntentId, Address)> {
    let client = Address::new("0xclient");
    let intent = services
        .engine
        .create_intent(demo_request(args.bidding_ms), client.clone())
        .context("creating demo intent")?;

    for (addr, amount, time_ms, confidence, rep, tee) in [
        ("0xb1", 600_000u64, 500u64, 0.9, 0.9, false),
        ("0xb2", 800_000, 300, 0.95, 0.7, true),
        ("0xb3", 500_000, 2_000, 0.6, 0.5, false),
    ] {
        services
            .engine
            .submit_bid(
                BidSubmission {
                    intent_id: intent.id.clone(),
                    amount,
                    estimated_time_ms: time_ms,
                    confidence,
                    capabilities: vec!["price.lookup".to_string()],
                },
                provider(addr, rep, tee),
            )
            .with_context(|| format!("bid from {addr}"))?;
    }

    services.engine.force_close_bidding(&intent.id)?;
    let assigned = services
        .engine
        .get_intent(&intent.id)
        .context("intent vanished")?;
    let winner = assigned
        .assigned_provider
        .clone()
        .context("no winner selected")?;

    services.engine.mark_execution_started(&intent.id)?;
    services.engine.submit_result(
        &intent.id,
        ResultSubmission {
            provider: winner.clone(),
            payload: json!({"symbol": "BTC", "price": price}),
            execution_time_ms: 420,
        },
    )?;

    // Settlement runs through the safety gate.
    let winning_bid = services
        .engine
        .get_bids_for_intent(&intent.id)
        .into_iter()
        .find(|b| b.provider == winner)
        .context("winning bid missing")?;
    let check = services.safety.check_payment(&SafetyTransaction {
        id: format!("pay_{}", intent.id),
        timestamp: SystemClock.now_ms(),
        sender: client,
        recipient: winner.clone(),
        amount: winning_bid.amount,
        resource: intent.intent_type.clone(),
        session_id: None,
    });
    if check.allowed {
        services
            .engine
            .record_payment(&intent.id, winning_bid.amount, format!("tx_{}", intent.id))?;
        services.safety.record_outcome(true);
    } else {
        info!(reason = ?check.reason, "settlement blocked by the safety gate");
    }

    Ok((intent.id, winner))
}

fn scenario_auction(services: &Services, args: &Args) -> anyhow::Result<()> {
    info!("── scenario: auction ──");
    let (intent_id, winner) = run_auction(services, args, 98_400.0)?;
    info!(intent_id = %intent_id, winner = %winner, "auction settled");
    Ok(())
}

fn scenario_failover(services: &Services, args: &Args) -> anyhow::Result<()> {
    info!("── scenario: failover ──");
    let intent = services
        .engine
        .create_intent(demo_request(args.bidding_ms), Address::new("0xclient"))?;
    for (addr, amount) in [("0xb1", 600_000u64), ("0xb2", 700_000)] {
        services.engine.submit_bid(
            BidSubmission {
                intent_id: intent.id.clone(),
                amount,
                estimated_time_ms: 500,
                confidence: 0.9,
                capabilities: vec![],
            },
            provider(addr, 0.8, false),
        )?;
    }
    services.engine.force_close_bidding(&intent.id)?;

    // The winner never calls mark_execution_started; hand off manually
    // instead of waiting out the pickup window.
    services.engine.trigger_failover(&intent.id)?;
    let reassigned = services.engine.get_intent(&intent.id).unwrap();
    info!(
        provider = %reassigned.assigned_provider.clone().unwrap(),
        "runner-up assigned after failover"
    );

    services.engine.submit_result(
        &intent.id,
        ResultSubmission {
            provider: reassigned.assigned_provider.unwrap(),
            payload: json!({"symbol": "BTC", "price": 98_500.0}),
            execution_time_ms: 800,
        },
    )?;
    Ok(())
}

async fn scenario_dispute(services: &Services, args: &Args) -> anyhow::Result<()> {
    info!("── scenario: dispute ──");
    // Provider reports a price far from the oracle reference (98 500).
    let (intent_id, winner) = run_auction(services, args, 80_000.0)?;

    let escrow_id = format!("esc_{intent_id}");
    services
        .escrow
        .fund(escrow_id.clone(), Address::new("0xclient"), MICROS_PER_USDC);

    let dispute = services
        .resolver
        .open_dispute(OpenDisputeRequest {
            intent_id,
            escrow_id,
            client: Address::new("0xclient"),
            provider: winner,
            reason: DisputeReason::IncorrectData,
            description: "reported price is far from market".to_string(),
            intent_type: Some("crypto.price".to_string()),
            provided_value: json!({"symbol": "BTC", "price": 80_000.0}),
            expected_value: None,
        })
        .await?;

    let resolution = dispute.resolution.as_ref().context("dispute unresolved")?;
    info!(
        dispute_id = %dispute.id,
        verdict = ?resolution.verdict,
        deviation = ?dispute.deviation_percent,
        penalty = resolution.reputation_penalty,
        "dispute adjudicated"
    );
    if let Some(record) = &dispute.slashing_record {
        info!(
            slashed = record.slashed_amount,
            recipient = %record.recipient,
            tx_ref = %record.tx_ref,
            "escrow slashed"
        );
    }
    Ok(())
}

fn scenario_safety(services: &Services) -> anyhow::Result<()> {
    info!("── scenario: safety ──");
    let mut blocked = None;
    for i in 0..12 {
        let check = services.safety.check_payment(&SafetyTransaction {
            id: format!("burst_{i}"),
            timestamp: SystemClock.now_ms(),
            sender: Address::new("0xagent"),
            recipient: Address::new("0xservice"),
            amount: 2 * MICROS_PER_USDC,
            resource: "api.call".to_string(),
            session_id: Some("sess_demo".to_string()),
        });
        if !check.allowed {
            blocked = check.reason;
            break;
        }
    }
    match blocked {
        Some(reason) => info!(%reason, "burst stopped by the safety gate"),
        None => info!("burst completed under the configured limits"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,synapse=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!(scenario = ?args.scenario, "synapse demo starting");

    let services = build_services(&args);

    match args.scenario {
        Scenario::Auction => scenario_auction(&services, &args)?,
        Scenario::Failover => scenario_failover(&services, &args)?,
        Scenario::Dispute => scenario_dispute(&services, &args).await?,
        Scenario::Safety => scenario_safety(&services)?,
        Scenario::All => {
            scenario_auction(&services, &args)?;
            scenario_failover(&services, &args)?;
            scenario_dispute(&services, &args).await?;
            scenario_safety(&services)?;
        }
    }

    let engine_stats = services.engine.stats();
    let dispute_stats = services.resolver.stats().await;
    let safety_stats = services.safety.stats();
    info!(
        intents = engine_stats.intents_created,
        completed = engine_stats.intents_completed,
        bids = engine_stats.bids_received,
        failovers = engine_stats.failovers,
        disputes = dispute_stats.total,
        slashes = dispute_stats.slashes_executed,
        payments_checked = safety_stats.payments_checked,
        payments_blocked = safety_stats.payments_blocked,
        "demo finished"
    );
    Ok(())
}
