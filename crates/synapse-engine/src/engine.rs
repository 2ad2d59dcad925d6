//! The intent engine.
//!
//! Sole owner of intents and bids. Runs the auction state machine: open →
//! bidding closed → winner selected → execution (with failover through the
//! runner-up queue) → completion and settlement. Two timer families drive
//! the deadlines; a periodic cleanup pass reclaims terminal intents.
//!
//! Every mutation runs under the engine's lock; events are collected inside
//! the critical section and emitted after it releases, so subscribers see
//! per-intent program order without being able to re-enter the engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use synapse_core::bus::EventBus;
use synapse_core::clock::Clock;
use synapse_core::constants::{
    CLEANUP_INTERVAL_MS, DEFAULT_BIDDING_DURATION_MS, DEFAULT_EXECUTION_TIMEOUT_MS,
    DEFAULT_MAX_LATENCY_MS, FAILOVER_TIMEOUT_MS, MAX_BIDS_PER_INTENT, MAX_INTENTS,
    MIN_BIDDING_DURATION_MS, MIN_BID_AMOUNT, RETENTION_PERIOD_MS,
};
use synapse_core::error::SynapseError;
use synapse_core::events::Event;
use synapse_core::ids::IdSource;
use synapse_core::intent::{
    Bid, BidStatus, BidSubmission, CreateIntentRequest, Intent, IntentReader, IntentStatus,
    ProviderInfo, ResultSubmission,
};
use synapse_core::types::{Address, Amount, BidId, IntentId, TimestampMs};

use crate::scorer::{compare_ranked, score_bid, BidQuote};
use crate::timer::{TimerKey, TimerQueue};

// ── Configuration ────────────────────────────────────────────────────────────

/// Engine tuning knobs. `Default` carries the platform values; partial
/// overrides merge with struct-update syntax.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long terminal intents stay resident before eviction.
    pub retention_period_ms: u64,
    /// Interval between cleanup passes.
    pub cleanup_interval_ms: u64,
    /// Hard cap on resident intents; oldest terminal evicted first.
    pub max_intents: usize,
    pub max_bids_per_intent: usize,
    pub default_bidding_duration_ms: u64,
    pub default_execution_timeout_ms: u64,
    /// Window an assigned provider has to pick the job up.
    pub failover_timeout_ms: u64,
    pub min_bid_amount: Amount,
    /// Platform floor for a requested bidding window.
    pub min_bidding_duration_ms: u64,
    /// Scorer latency ceiling when the intent declares none.
    pub default_max_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_period_ms: RETENTION_PERIOD_MS,
            cleanup_interval_ms: CLEANUP_INTERVAL_MS,
            max_intents: MAX_INTENTS,
            max_bids_per_intent: MAX_BIDS_PER_INTENT,
            default_bidding_duration_ms: DEFAULT_BIDDING_DURATION_MS,
            default_execution_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
            failover_timeout_ms: FAILOVER_TIMEOUT_MS,
            min_bid_amount: MIN_BID_AMOUNT,
            min_bidding_duration_ms: MIN_BIDDING_DURATION_MS,
            default_max_latency_ms: DEFAULT_MAX_LATENCY_MS,
        }
    }
}

// ── Statistics ───────────────────────────────────────────────────────────────

/// Monitoring snapshot: lifetime totals plus live gauges.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EngineStats {
    pub intents_created: u64,
    pub intents_completed: u64,
    pub intents_failed: u64,
    pub intents_cancelled: u64,
    pub bids_received: u64,
    pub failovers: u64,
    pub cleanup_runs: u64,
    pub intents_evicted: u64,
    pub active_intents: usize,
    pub active_timers: usize,
}

#[derive(Default)]
struct Counters {
    intents_created: u64,
    intents_completed: u64,
    intents_failed: u64,
    intents_cancelled: u64,
    bids_received: u64,
    failovers: u64,
    cleanup_runs: u64,
    intents_evicted: u64,
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct EngineInner {
    intents: HashMap<IntentId, Intent>,
    /// Bids per intent, kept sorted by rank. Evicting an intent drops its
    /// bids with it.
    bids: HashMap<IntentId, Vec<Bid>>,
    counters: Counters,
}

/// The auction engine. Construct with [`IntentEngine::new`] and share behind
/// the returned `Arc`; call [`IntentEngine::spawn_scheduler`] to arm the
/// deadline-driven paths (tests usually drive deadlines directly instead).
pub struct IntentEngine {
    config: EngineConfig,
    inner: Mutex<EngineInner>,
    timers: TimerQueue,
    bus: Arc<EventBus>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl IntentEngine {
    pub fn new(
        config: EngineConfig,
        bus: Arc<EventBus>,
        ids: Arc<dyn IdSource>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            config,
            inner: Mutex::new(EngineInner::default()),
            timers: TimerQueue::new(),
            bus,
            ids,
            clock,
        });
        let now = engine.clock.now_ms();
        engine
            .timers
            .schedule(TimerKey::Cleanup, now + engine.config.cleanup_interval_ms as i64);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the single scheduler task that drains the timer heap. It holds
    /// only a `Weak` reference, so dropping the last engine handle lets the
    /// process shut down; the task exits on its next wake-up.
    pub fn spawn_scheduler(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let notify = self.timers.notify_handle();
        tokio::spawn(async move {
            loop {
                let sleep_ms = {
                    let Some(engine) = weak.upgrade() else { break };
                    let now = engine.clock.now_ms();
                    match engine.timers.next_deadline() {
                        Some(at) => (at - now).max(0) as u64,
                        // Nothing armed: park until a schedule() wakes us.
                        None => 60_000,
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
                    _ = notify.notified() => {}
                }
                let Some(engine) = weak.upgrade() else { break };
                let now = engine.clock.now_ms();
                for key in engine.timers.pop_due(now) {
                    engine.handle_timer(key);
                }
            }
        })
    }

    fn handle_timer(&self, key: TimerKey) {
        match key {
            TimerKey::Bidding(id) => {
                // The intent may have been cancelled between pop and dispatch.
                if let Err(e) = self.close_bidding(&id) {
                    debug!(intent_id = %id, error = %e, "bidding timer fired on stale intent");
                }
            }
            TimerKey::Execution(id) => self.execution_timeout(&id),
            TimerKey::Cleanup => {
                self.run_cleanup();
                let now = self.clock.now_ms();
                self.timers
                    .schedule(TimerKey::Cleanup, now + self.config.cleanup_interval_ms as i64);
            }
        }
    }

    // ── create_intent ─────────────────────────────────────────────────────────

    pub fn create_intent(
        &self,
        request: CreateIntentRequest,
        client: Address,
    ) -> Result<Intent, SynapseError> {
        if request.intent_type.trim().is_empty() {
            return Err(SynapseError::InvalidIntentType);
        }
        if request.max_budget <= self.config.min_bid_amount {
            return Err(SynapseError::BudgetTooLow {
                min: self.config.min_bid_amount,
            });
        }
        let bidding_ms = request
            .bidding_duration_ms
            .unwrap_or(self.config.default_bidding_duration_ms);
        if bidding_ms < self.config.min_bidding_duration_ms {
            return Err(SynapseError::BiddingDurationTooShort {
                min_ms: self.config.min_bidding_duration_ms,
            });
        }
        let execution_ms = request
            .execution_timeout_ms
            .unwrap_or(self.config.default_execution_timeout_ms);

        let now = self.clock.now_ms();
        let bidding_deadline = now + bidding_ms as i64;
        let intent = Intent {
            id: IntentId::new(self.ids.next_id("int")),
            client,
            intent_type: request.intent_type,
            category: request.category,
            params: request.params,
            max_budget: request.max_budget,
            currency: request.currency,
            requirements: request.requirements,
            created_at: now,
            bidding_deadline,
            execution_deadline: bidding_deadline + execution_ms as i64,
            status: IntentStatus::Open,
            assigned_provider: None,
            failover_queue: Vec::new(),
            result: None,
            failure_reason: None,
            terminal_at: None,
        };

        {
            let mut inner = self.inner.lock();
            let evicted = self.enforce_cap_locked(&mut inner);
            inner.counters.intents_evicted += evicted as u64;
            inner.bids.insert(intent.id.clone(), Vec::new());
            inner.intents.insert(intent.id.clone(), intent.clone());
            inner.counters.intents_created += 1;
        }
        self.timers
            .schedule(TimerKey::Bidding(intent.id.clone()), bidding_deadline);

        info!(
            intent_id = %intent.id,
            intent_type = %intent.intent_type,
            max_budget = intent.max_budget,
            "intent created"
        );
        self.bus.emit(&Event::IntentCreated {
            intent: intent.clone(),
        });
        Ok(intent)
    }

    // ── submit_bid ────────────────────────────────────────────────────────────

    pub fn submit_bid(
        &self,
        submission: BidSubmission,
        provider: ProviderInfo,
    ) -> Result<Bid, SynapseError> {
        let now = self.clock.now_ms();
        let stored;
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get(&submission.intent_id)
                .ok_or_else(|| SynapseError::IntentNotFound(submission.intent_id.to_string()))?;

            if intent.status != IntentStatus::Open {
                return Err(SynapseError::NotOpenForBidding {
                    status: intent.status,
                });
            }
            if now > intent.bidding_deadline {
                return Err(SynapseError::BiddingDeadlinePassed);
            }
            if submission.amount < self.config.min_bid_amount
                || submission.amount > intent.max_budget
            {
                return Err(SynapseError::BidAmountOutOfRange {
                    min: self.config.min_bid_amount,
                    max: intent.max_budget,
                });
            }
            let reputation = provider.normalized_reputation();
            if reputation < intent.requirements.min_reputation {
                return Err(SynapseError::ReputationTooLow {
                    required: intent.requirements.min_reputation,
                    actual: reputation,
                });
            }
            if intent.requirements.require_tee && !provider.tee_attested {
                return Err(SynapseError::TeeRequired);
            }
            if intent
                .requirements
                .excluded_providers
                .contains(&provider.address)
            {
                return Err(SynapseError::ProviderExcluded);
            }

            let max_budget = intent.max_budget;
            let max_latency = intent
                .requirements
                .max_latency_ms
                .unwrap_or(self.config.default_max_latency_ms);
            let execution_deadline = intent.execution_deadline;
            let intent_id = intent.id.clone();

            let bids = inner.bids.entry(intent_id.clone()).or_default();
            if bids.iter().any(|b| b.provider == provider.address) {
                return Err(SynapseError::DuplicateBid);
            }
            if bids.len() >= self.config.max_bids_per_intent {
                return Err(SynapseError::TooManyBids {
                    max: self.config.max_bids_per_intent,
                });
            }

            let score = score_bid(
                &BidQuote {
                    amount: submission.amount,
                    estimated_time_ms: submission.estimated_time_ms,
                    confidence: submission.confidence,
                    reputation,
                    tee_attested: provider.tee_attested,
                },
                max_budget,
                max_latency,
            );

            let bid = Bid {
                id: BidId::new(self.ids.next_id("bid")),
                intent_id,
                provider: provider.address,
                provider_id: provider.provider_id,
                amount: submission.amount,
                estimated_time_ms: submission.estimated_time_ms,
                confidence: submission.confidence,
                reputation,
                tee_attested: provider.tee_attested,
                capabilities: submission.capabilities,
                calculated_score: score,
                rank: 0,
                submitted_at: now,
                expires_at: execution_deadline,
                status: BidStatus::Pending,
            };
            let bid_id = bid.id.clone();
            bids.push(bid);

            // Re-rank the full set on every insert.
            bids.sort_by(compare_ranked);
            for (i, b) in bids.iter_mut().enumerate() {
                b.rank = (i + 1) as u32;
            }
            stored = bids
                .iter()
                .find(|b| b.id == bid_id)
                .cloned()
                .expect("bid just inserted");
            inner.counters.bids_received += 1;
        }

        debug!(
            bid_id = %stored.id,
            intent_id = %stored.intent_id,
            score = stored.calculated_score,
            rank = stored.rank,
            "bid received"
        );
        self.bus.emit(&Event::BidReceived { bid: stored.clone() });
        Ok(stored)
    }

    // ── Bidding closure & winner selection ────────────────────────────────────

    /// Collapse the bidding window immediately. The timer-driven path calls
    /// this too, so tests and demos can drive the auction without sleeping.
    pub fn force_close_bidding(&self, id: &IntentId) -> Result<(), SynapseError> {
        self.close_bidding(id)
    }

    fn close_bidding(&self, id: &IntentId) -> Result<(), SynapseError> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if intent.status != IntentStatus::Open {
                return Err(SynapseError::WrongIntentStatus {
                    expected: "open",
                    actual: intent.status,
                });
            }
            self.timers.cancel(&TimerKey::Bidding(id.clone()));

            let has_bids = inner.bids.get(id).map(|b| !b.is_empty()).unwrap_or(false);
            if !has_bids {
                let intent = inner.intents.get_mut(id).expect("checked above");
                intent.status = IntentStatus::Failed;
                intent.failure_reason = Some("no bids received".to_string());
                intent.terminal_at = Some(now);
                inner.counters.intents_failed += 1;
                warn!(intent_id = %id, "bidding closed with no bids");
                let snapshot = inner.intents.get(id).expect("present").clone();
                events.push(Event::IntentFailed {
                    intent: snapshot,
                    reason: "no bids received".to_string(),
                });
            } else {
                inner.intents.get_mut(id).expect("checked above").status =
                    IntentStatus::BiddingClosed;
                self.select_winner_locked(&mut inner, id, now, &mut events);
            }
        }
        for event in &events {
            self.bus.emit(event);
        }
        Ok(())
    }

    /// From the pending bids pick the highest-scoring one, queue the rest
    /// for failover in score order, and arm the pickup window.
    fn select_winner_locked(
        &self,
        inner: &mut EngineInner,
        id: &IntentId,
        now: TimestampMs,
        events: &mut Vec<Event>,
    ) {
        let mut winner: Option<Bid> = None;
        let mut queue = Vec::new();
        {
            let bids = inner.bids.get_mut(id).expect("intent has a bid vec");
            for bid in bids.iter_mut() {
                if bid.status != BidStatus::Pending {
                    continue;
                }
                if winner.is_none() {
                    bid.status = BidStatus::Accepted;
                    winner = Some(bid.clone());
                } else {
                    bid.status = BidStatus::Failover;
                    queue.push(bid.provider.clone());
                }
                events.push(Event::BidUpdated { bid: bid.clone() });
            }
        }

        let Some(winner) = winner else {
            // No pending bids survived to closure; nothing to assign.
            let intent = inner.intents.get_mut(id).expect("present");
            intent.status = IntentStatus::Failed;
            intent.failure_reason = Some("no bids received".to_string());
            intent.terminal_at = Some(now);
            inner.counters.intents_failed += 1;
            let snapshot = inner.intents.get(id).expect("present").clone();
            events.push(Event::IntentFailed {
                intent: snapshot,
                reason: "no bids received".to_string(),
            });
            return;
        };

        let intent = inner.intents.get_mut(id).expect("present");
        intent.assigned_provider = Some(winner.provider.clone());
        intent.failover_queue = queue;
        intent.status = IntentStatus::Assigned;
        let snapshot = intent.clone();

        self.timers.schedule(
            TimerKey::Execution(id.clone()),
            now + self.config.failover_timeout_ms as i64,
        );

        info!(
            intent_id = %id,
            provider = %winner.provider,
            score = winner.calculated_score,
            runners_up = snapshot.failover_queue.len(),
            "winner selected"
        );
        events.push(Event::WinnerSelected {
            intent_id: id.clone(),
            bid: winner,
        });
        events.push(Event::IntentUpdated { intent: snapshot });
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// The assigned provider acknowledges pickup: `assigned → executing`,
    /// and the short failover window is replaced by the intent's overall
    /// execution deadline.
    pub fn mark_execution_started(&self, id: &IntentId) -> Result<(), SynapseError> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get_mut(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if intent.status != IntentStatus::Assigned {
                return Err(SynapseError::WrongIntentStatus {
                    expected: "assigned",
                    actual: intent.status,
                });
            }
            intent.status = IntentStatus::Executing;
            self.timers
                .schedule(TimerKey::Execution(id.clone()), intent.execution_deadline);
            events.push(Event::IntentUpdated {
                intent: intent.clone(),
            });
        }
        for event in &events {
            self.bus.emit(event);
        }
        Ok(())
    }

    /// Only the currently assigned provider may deliver; everyone else is
    /// rejected, including the previous provider after a failover.
    pub fn submit_result(
        &self,
        id: &IntentId,
        submission: ResultSubmission,
    ) -> Result<Intent, SynapseError> {
        let now = self.clock.now_ms();
        let snapshot;
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if !matches!(
                intent.status,
                IntentStatus::Assigned | IntentStatus::Executing
            ) {
                return Err(SynapseError::WrongIntentStatus {
                    expected: "assigned or executing",
                    actual: intent.status,
                });
            }
            if intent.assigned_provider.as_ref() != Some(&submission.provider) {
                return Err(SynapseError::WrongProvider);
            }

            let mut provider_id = submission.provider.to_string();
            if let Some(bids) = inner.bids.get_mut(id) {
                match bids.iter_mut().find(|b| b.status == BidStatus::Accepted) {
                    Some(bid) => {
                        bid.status = BidStatus::Executed;
                        provider_id = bid.provider_id.clone();
                        events.push(Event::BidUpdated { bid: bid.clone() });
                    }
                    None => {
                        debug_assert!(false, "assigned provider without an accepted bid");
                        error!(intent_id = %id, "no accepted bid at completion; degrading");
                    }
                }
            }

            let intent = inner.intents.get_mut(id).expect("checked above");
            intent.result = Some(synapse_core::intent::IntentResult {
                provider_id,
                payload: submission.payload,
                execution_time_ms: submission.execution_time_ms,
                settled_amount: None,
                settlement_tx: None,
                completed_at: now,
            });
            intent.status = IntentStatus::Completed;
            intent.terminal_at = Some(now);
            inner.counters.intents_completed += 1;
            self.timers.cancel(&TimerKey::Execution(id.clone()));

            snapshot = inner.intents.get(id).expect("present").clone();
            events.push(Event::IntentCompleted {
                intent: snapshot.clone(),
            });
        }

        info!(intent_id = %id, "intent completed");
        for event in &events {
            self.bus.emit(event);
        }
        Ok(snapshot)
    }

    // ── Failover ──────────────────────────────────────────────────────────────

    /// Synchronous handoff to the next-ranked bid, identical to the path the
    /// execution timer takes.
    pub fn trigger_failover(&self, id: &IntentId) -> Result<(), SynapseError> {
        let now = self.clock.now_ms();
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if !matches!(
                intent.status,
                IntentStatus::Assigned | IntentStatus::Executing
            ) {
                return Err(SynapseError::WrongIntentStatus {
                    expected: "assigned or executing",
                    actual: intent.status,
                });
            }
            self.failover_locked(&mut inner, id, now, &mut events);
        }
        for event in &events {
            self.bus.emit(event);
        }
        Ok(())
    }

    fn execution_timeout(&self, id: &IntentId) {
        let now = self.clock.now_ms();
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let Some(intent) = inner.intents.get(id) else {
                return;
            };
            // A stale timer racing a terminal transition is a no-op.
            if intent.status.is_terminal() {
                return;
            }
            self.failover_locked(&mut inner, id, now, &mut events);
        }
        for event in &events {
            self.bus.emit(event);
        }
    }

    fn failover_locked(
        &self,
        inner: &mut EngineInner,
        id: &IntentId,
        now: TimestampMs,
        events: &mut Vec<Event>,
    ) {
        let Some(failed_provider) = inner
            .intents
            .get(id)
            .and_then(|i| i.assigned_provider.clone())
        else {
            debug_assert!(false, "failover on an intent with no assigned provider");
            error!(intent_id = %id, "failover without assigned provider; degrading");
            return;
        };

        // The current winner missed their window.
        if let Some(bids) = inner.bids.get_mut(id) {
            match bids.iter_mut().find(|b| b.status == BidStatus::Accepted) {
                Some(bid) => {
                    bid.status = BidStatus::Failed;
                    events.push(Event::BidUpdated { bid: bid.clone() });
                }
                None => {
                    debug_assert!(false, "assigned provider without an accepted bid");
                    error!(intent_id = %id, "no accepted bid at failover; degrading");
                }
            }
        }

        let next = {
            let intent = inner.intents.get_mut(id).expect("present");
            if intent.failover_queue.is_empty() {
                None
            } else {
                Some(intent.failover_queue.remove(0))
            }
        };

        match next {
            Some(next_provider) => {
                if let Some(bids) = inner.bids.get_mut(id) {
                    match bids
                        .iter_mut()
                        .find(|b| b.provider == next_provider && b.status == BidStatus::Failover)
                    {
                        Some(bid) => {
                            bid.status = BidStatus::Accepted;
                            events.push(Event::BidUpdated { bid: bid.clone() });
                        }
                        None => {
                            debug_assert!(false, "failover queue entry without a queued bid");
                            error!(
                                intent_id = %id,
                                provider = %next_provider,
                                "failover target has no queued bid; degrading"
                            );
                        }
                    }
                }
                let intent = inner.intents.get_mut(id).expect("present");
                intent.assigned_provider = Some(next_provider.clone());
                intent.status = IntentStatus::Assigned;
                let snapshot = intent.clone();
                inner.counters.failovers += 1;

                self.timers.schedule(
                    TimerKey::Execution(id.clone()),
                    now + self.config.failover_timeout_ms as i64,
                );

                info!(
                    intent_id = %id,
                    failed = %failed_provider,
                    next = %next_provider,
                    "failover triggered"
                );
                events.push(Event::FailoverTriggered {
                    intent_id: id.clone(),
                    failed_provider,
                    new_provider: next_provider,
                });
                events.push(Event::IntentUpdated { intent: snapshot });
            }
            None => {
                let intent = inner.intents.get_mut(id).expect("present");
                intent.status = IntentStatus::Failed;
                intent.failure_reason = Some("all providers failed".to_string());
                intent.terminal_at = Some(now);
                intent.assigned_provider = None;
                let snapshot = intent.clone();
                inner.counters.intents_failed += 1;
                self.timers.cancel(&TimerKey::Execution(id.clone()));

                warn!(intent_id = %id, "failover queue exhausted; intent failed");
                events.push(Event::IntentFailed {
                    intent: snapshot,
                    reason: "all providers failed".to_string(),
                });
            }
        }
    }

    // ── Settlement & cancellation ─────────────────────────────────────────────

    pub fn record_payment(
        &self,
        id: &IntentId,
        amount: Amount,
        tx_ref: impl Into<String>,
    ) -> Result<(), SynapseError> {
        let tx_ref = tx_ref.into();
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get_mut(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if intent.status != IntentStatus::Completed {
                return Err(SynapseError::WrongIntentStatus {
                    expected: "completed",
                    actual: intent.status,
                });
            }
            match intent.result.as_mut() {
                Some(result) => {
                    result.settled_amount = Some(amount);
                    result.settlement_tx = Some(tx_ref.clone());
                }
                None => {
                    debug_assert!(false, "completed intent without a result");
                    error!(intent_id = %id, "completed intent missing result; degrading");
                }
            }
        }
        info!(intent_id = %id, amount, tx_ref = %tx_ref, "payment settled");
        self.bus.emit(&Event::PaymentSettled {
            intent_id: id.clone(),
            amount,
            tx_ref,
        });
        Ok(())
    }

    /// Only the originator may cancel, and only before execution completes.
    /// Both timers are disarmed atomically with the transition.
    pub fn cancel_intent(&self, id: &IntentId, caller: &Address) -> Result<(), SynapseError> {
        let now = self.clock.now_ms();
        let snapshot;
        {
            let mut inner = self.inner.lock();
            let intent = inner
                .intents
                .get_mut(id)
                .ok_or_else(|| SynapseError::IntentNotFound(id.to_string()))?;
            if intent.client != *caller {
                return Err(SynapseError::NotIntentOwner);
            }
            if !matches!(
                intent.status,
                IntentStatus::Open | IntentStatus::BiddingClosed | IntentStatus::Assigned
            ) {
                return Err(SynapseError::CancelNotPermitted {
                    status: intent.status,
                });
            }
            self.timers.cancel(&TimerKey::Bidding(id.clone()));
            self.timers.cancel(&TimerKey::Execution(id.clone()));
            intent.status = IntentStatus::Cancelled;
            intent.terminal_at = Some(now);
            inner.counters.intents_cancelled += 1;
            snapshot = inner.intents.get(id).expect("present").clone();
        }
        info!(intent_id = %id, "intent cancelled");
        self.bus.emit(&Event::IntentUpdated { intent: snapshot });
        Ok(())
    }

    // ── Memory reclamation ────────────────────────────────────────────────────

    /// Evict terminal intents past the retention window, then enforce the
    /// resident cap. Returns how many intents were evicted.
    pub fn run_cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let retention = self.config.retention_period_ms as i64;
        let mut inner = self.inner.lock();

        let expired: Vec<IntentId> = inner
            .intents
            .values()
            .filter(|i| i.terminal_at.map(|t| t + retention <= now).unwrap_or(false))
            .map(|i| i.id.clone())
            .collect();
        for id in &expired {
            inner.intents.remove(id);
            inner.bids.remove(id);
        }

        let mut evicted = expired.len();
        evicted += self.enforce_cap_locked(&mut inner);

        inner.counters.cleanup_runs += 1;
        inner.counters.intents_evicted += evicted as u64;
        if evicted > 0 {
            debug!(evicted, "cleanup evicted terminal intents");
        }
        evicted
    }

    /// Evict oldest terminal intents while over the resident cap. Intents
    /// still in flight are never evicted, so a flood of live intents can
    /// exceed the cap until they terminate.
    fn enforce_cap_locked(&self, inner: &mut EngineInner) -> usize {
        let mut evicted = 0;
        while inner.intents.len() >= self.config.max_intents {
            let oldest = inner
                .intents
                .values()
                .filter(|i| i.status.is_terminal())
                .min_by_key(|i| i.terminal_at.unwrap_or(i.created_at))
                .map(|i| i.id.clone());
            match oldest {
                Some(id) => {
                    inner.intents.remove(&id);
                    inner.bids.remove(&id);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    pub fn get_intent(&self, id: &IntentId) -> Option<Intent> {
        self.inner.lock().intents.get(id).cloned()
    }

    /// Bids for an intent in rank order (rank 1 first).
    pub fn get_bids_for_intent(&self, id: &IntentId) -> Vec<Bid> {
        self.inner
            .lock()
            .bids
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn snapshot_filtered(&self, pred: impl Fn(&Intent) -> bool) -> Vec<Intent> {
        self.inner
            .lock()
            .intents
            .values()
            .filter(|i| pred(i))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        let inner = self.inner.lock();
        EngineStats {
            intents_created: inner.counters.intents_created,
            intents_completed: inner.counters.intents_completed,
            intents_failed: inner.counters.intents_failed,
            intents_cancelled: inner.counters.intents_cancelled,
            bids_received: inner.counters.bids_received,
            failovers: inner.counters.failovers,
            cleanup_runs: inner.counters.cleanup_runs,
            intents_evicted: inner.counters.intents_evicted,
            active_intents: inner
                .intents
                .values()
                .filter(|i| !i.status.is_terminal())
                .count(),
            active_timers: self.timers.active_count(),
        }
    }
}

impl IntentReader for IntentEngine {
    fn intent_snapshot(&self, id: &IntentId) -> Option<Intent> {
        self.get_intent(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
