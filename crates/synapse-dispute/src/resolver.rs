//! The dispute resolver.
//!
//! Turns an allegation of provider fault into a verdict and, on provider
//! fault, a real escrow slashing. The pipeline for one dispute:
//!
//!   opened → evidence collection → oracle query → under review →
//!   deviation verdict → resolved → (client wins) escrow slash
//!
//! State lives behind a `tokio::sync::Mutex` because the pipeline suspends
//! around the oracle and escrow awaits: evidence appends commit before the
//! oracle await, the verdict commits after it, and slashing runs strictly
//! after resolution is committed. A slashing failure is logged and never
//! reopens the dispute.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use synapse_core::bus::EventBus;
use synapse_core::clock::Clock;
use synapse_core::constants::{
    DEFAULT_DEVIATION_THRESHOLD, DEFAULT_SLASH_PERCENTAGE, EVIDENCE_TIMEOUT_MS,
    MAX_REPUTATION_PENALTY, MIN_REPUTATION_PENALTY,
};
use synapse_core::dispute::{
    Dispute, DisputeStatus, Evidence, EvidenceSubmitter, OpenDisputeRequest, Resolution,
    SlashingRecord, Verdict,
};
use synapse_core::error::SynapseError;
use synapse_core::escrow::EscrowAdapter;
use synapse_core::events::Event;
use synapse_core::ids::IdSource;
use synapse_core::intent::IntentReader;
use synapse_core::types::{Address, Amount, DisputeId, EvidenceId, IntentId};

use crate::oracle::OracleRegistry;

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// When false the resolver never queries oracle capabilities; the
    /// null-comparand rule decides unless the client supplied an
    /// expectation.
    pub enable_real_oracles: bool,
    /// When false, client-wins verdicts record no slashing.
    pub enable_real_slashing: bool,
    /// Unresolved disputes older than this are expired by `expire_stale`.
    pub evidence_timeout_ms: u64,
    /// Relative deviation above which the provider is at fault.
    pub deviation_threshold: f64,
    /// Fraction of the escrow slashed on provider fault.
    pub slash_percentage: f64,
    pub min_reputation_penalty: f64,
    pub max_reputation_penalty: f64,
    /// Slash recipient; falls back to the dispute's client when unset.
    pub platform_wallet: Option<Address>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enable_real_oracles: true,
            enable_real_slashing: true,
            evidence_timeout_ms: EVIDENCE_TIMEOUT_MS,
            deviation_threshold: DEFAULT_DEVIATION_THRESHOLD,
            slash_percentage: DEFAULT_SLASH_PERCENTAGE,
            min_reputation_penalty: MIN_REPUTATION_PENALTY,
            max_reputation_penalty: MAX_REPUTATION_PENALTY,
            platform_wallet: None,
        }
    }
}

// ── Inference & adjudication ─────────────────────────────────────────────────

/// Guess the intent type from the shape of a delivered value. This is the
/// last-resort fallback: the dispute request's explicit type and the
/// engine's intent record are both consulted first. Extend by match arm.
pub fn infer_intent_type(value: &Value) -> Option<&'static str> {
    let obj = value.as_object()?;
    if obj.contains_key("symbol") || obj.contains_key("price") {
        return Some("crypto.price");
    }
    if obj.contains_key("temperature") || obj.contains_key("city") {
        return Some("weather.current");
    }
    None
}

/// Extract the numeric comparand from an opaque value: a bare number, else
/// `.price`, else `.temperature`, else `.value`, else nothing.
fn extract_comparand(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    let obj = value.as_object()?;
    for key in ["price", "temperature", "value"] {
        if let Some(n) = obj.get(key).and_then(Value::as_f64) {
            return Some(n);
        }
    }
    None
}

/// The deviation test. Pure, so verdict monotonicity is unit-testable.
/// Returns the resolution and the raw deviation fraction when computable.
fn adjudicate(
    provided: &Value,
    reference: Option<&Value>,
    config: &ResolverConfig,
) -> (Resolution, Option<f64>) {
    let provided_num = extract_comparand(provided);
    let reference_num = reference.and_then(extract_comparand);

    match (provided_num, reference_num) {
        (Some(p), Some(r)) if r != 0.0 => {
            let deviation = ((p - r) / r).abs();
            if deviation > config.deviation_threshold {
                let penalty = (config.min_reputation_penalty + deviation * 0.5)
                    .clamp(config.min_reputation_penalty, config.max_reputation_penalty);
                (
                    Resolution {
                        verdict: Verdict::ClientWins,
                        client_refund: 1.0,
                        provider_payment: 0.0,
                        slash_fraction: config.slash_percentage,
                        reputation_penalty: penalty,
                        explanation: format!(
                            "provided value deviates {:.1}% from the reference (threshold {:.1}%)",
                            deviation * 100.0,
                            config.deviation_threshold * 100.0
                        ),
                    },
                    Some(deviation),
                )
            } else {
                (
                    Resolution {
                        verdict: Verdict::ProviderWins,
                        client_refund: 0.0,
                        provider_payment: 1.0,
                        slash_fraction: 0.0,
                        reputation_penalty: 0.0,
                        explanation: format!(
                            "provided value within the {:.1}% tolerance",
                            config.deviation_threshold * 100.0
                        ),
                    },
                    Some(deviation),
                )
            }
        }
        _ => (
            Resolution {
                verdict: Verdict::Split,
                client_refund: 0.5,
                provider_payment: 0.5,
                slash_fraction: 0.0,
                reputation_penalty: 0.0,
                explanation: "unable to determine fault".to_string(),
            },
            None,
        ),
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct ResolverCounters {
    pub opened: u64,
    pub client_wins: u64,
    pub provider_wins: u64,
    pub split: u64,
    pub expired: u64,
    pub slashes_executed: u64,
    pub slash_failures: u64,
}

#[derive(Default)]
pub(crate) struct ResolverInner {
    pub disputes: HashMap<DisputeId, Dispute>,
    pub by_intent: HashMap<IntentId, DisputeId>,
    pub counters: ResolverCounters,
}

pub struct DisputeResolver {
    config: ResolverConfig,
    pub(crate) inner: Mutex<ResolverInner>,
    oracles: OracleRegistry,
    escrow: Arc<dyn EscrowAdapter>,
    /// Read-only enrichment; absence is fine (the intent may be evicted).
    intents: Option<Arc<dyn IntentReader>>,
    bus: Arc<EventBus>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl DisputeResolver {
    pub fn new(
        config: ResolverConfig,
        oracles: OracleRegistry,
        escrow: Arc<dyn EscrowAdapter>,
        bus: Arc<EventBus>,
        ids: Arc<dyn IdSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            inner: Mutex::new(ResolverInner::default()),
            oracles,
            escrow,
            intents: None,
            bus,
            ids,
            clock,
        }
    }

    /// Attach the engine's read-only accessor. The resolver never holds a
    /// mutable back-edge into the engine.
    pub fn with_intent_reader(mut self, reader: Arc<dyn IntentReader>) -> Self {
        self.intents = Some(reader);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    // ── open_dispute ──────────────────────────────────────────────────────────

    /// Open a dispute against a completed intent and run the evidence
    /// pipeline through to a verdict. At most one dispute per intent.
    pub async fn open_dispute(&self, request: OpenDisputeRequest) -> Result<Dispute, SynapseError> {
        let escrow_account = self
            .escrow
            .get(&request.escrow_id)
            .await
            .ok_or_else(|| SynapseError::EscrowNotFound(request.escrow_id.clone()))?;

        // ── Open ──────────────────────────────────────────────────────────────
        let now = self.clock.now_ms();
        let dispute = {
            let mut inner = self.inner.lock().await;
            if inner.by_intent.contains_key(&request.intent_id) {
                return Err(SynapseError::DuplicateDispute(request.intent_id.to_string()));
            }
            let dispute = Dispute {
                id: DisputeId::new(self.ids.next_id("disp")),
                intent_id: request.intent_id.clone(),
                escrow_id: request.escrow_id.clone(),
                client: request.client.clone(),
                provider: request.provider.clone(),
                reason: request.reason,
                description: request.description.clone(),
                status: DisputeStatus::Opened,
                evidence: Vec::new(),
                provided_value: request.provided_value.clone(),
                reference_value: None,
                deviation_percent: None,
                resolution: None,
                slashing_record: None,
                created_at: now,
                resolved_at: None,
            };
            inner
                .by_intent
                .insert(request.intent_id.clone(), dispute.id.clone());
            inner.disputes.insert(dispute.id.clone(), dispute.clone());
            inner.counters.opened += 1;
            dispute
        };
        info!(
            dispute_id = %dispute.id,
            intent_id = %request.intent_id,
            reason = ?request.reason,
            "dispute opened"
        );
        self.bus.emit(&Event::DisputeOpened {
            dispute: dispute.clone(),
        });

        // ── Evidence collection ───────────────────────────────────────────────
        let mut appended = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            let d = inner
                .disputes
                .get_mut(&dispute.id)
                .expect("dispute just inserted");
            d.status = DisputeStatus::EvidenceCollection;

            let proof = Evidence {
                id: EvidenceId::new(self.ids.next_id("evd")),
                submitter: EvidenceSubmitter::Provider,
                evidence_type: "execution_proof".to_string(),
                payload: request.provided_value.clone(),
                timestamp: now,
            };
            d.evidence.push(proof.clone());
            appended.push(proof);

            if let Some(expected) = &request.expected_value {
                let reference = Evidence {
                    id: EvidenceId::new(self.ids.next_id("evd")),
                    submitter: EvidenceSubmitter::Client,
                    evidence_type: "reference_data".to_string(),
                    payload: expected.clone(),
                    timestamp: now,
                };
                d.evidence.push(reference.clone());
                appended.push(reference);
            }
        }
        for evidence in appended {
            self.bus.emit(&Event::DisputeEvidence {
                dispute_id: dispute.id.clone(),
                evidence,
            });
        }

        // ── Oracle query ──────────────────────────────────────────────────────
        // Inference order: explicit request field, then the engine's record,
        // then the value-shape heuristic.
        let intent_snapshot = self
            .intents
            .as_ref()
            .and_then(|r| r.intent_snapshot(&request.intent_id));
        let intent_type = request
            .intent_type
            .clone()
            .or_else(|| intent_snapshot.as_ref().map(|i| i.intent_type.clone()))
            .or_else(|| infer_intent_type(&request.provided_value).map(str::to_string));

        let oracle_value = match (&intent_type, self.config.enable_real_oracles) {
            (Some(t), true) => match self.oracles.get(t) {
                Some(oracle) => {
                    let params = intent_snapshot
                        .as_ref()
                        .map(|i| i.params.clone())
                        .unwrap_or_else(|| request.provided_value.clone());
                    oracle.get_value(&params).await
                }
                None => None,
            },
            _ => None,
        };

        // ── Review & verdict ──────────────────────────────────────────────────
        let resolved_at = self.clock.now_ms();
        let (resolved, oracle_evidence) = {
            let mut inner = self.inner.lock().await;
            let d = inner
                .disputes
                .get_mut(&dispute.id)
                .expect("dispute present");

            let mut oracle_evidence = None;
            if let Some(value) = &oracle_value {
                d.reference_value = Some(value.clone());
                let evidence = Evidence {
                    id: EvidenceId::new(self.ids.next_id("evd")),
                    submitter: EvidenceSubmitter::Oracle,
                    evidence_type: "oracle_reference".to_string(),
                    payload: value.clone(),
                    timestamp: resolved_at,
                };
                d.evidence.push(evidence.clone());
                oracle_evidence = Some(evidence);
            } else if let Some(expected) = &request.expected_value {
                // No oracle evidence; the client's expectation is the best
                // available reference.
                d.reference_value = Some(expected.clone());
            }
            d.status = DisputeStatus::UnderReview;

            let (resolution, deviation) =
                adjudicate(&d.provided_value, d.reference_value.as_ref(), &self.config);
            d.deviation_percent = deviation.map(|f| f * 100.0);
            d.status = match resolution.verdict {
                Verdict::ClientWins => DisputeStatus::ResolvedClientWins,
                Verdict::ProviderWins => DisputeStatus::ResolvedProviderWins,
                Verdict::Split => DisputeStatus::ResolvedSplit,
            };
            d.resolution = Some(resolution.clone());
            d.resolved_at = Some(resolved_at);
            match resolution.verdict {
                Verdict::ClientWins => inner.counters.client_wins += 1,
                Verdict::ProviderWins => inner.counters.provider_wins += 1,
                Verdict::Split => inner.counters.split += 1,
            }
            let snapshot = inner.disputes.get(&dispute.id).expect("present").clone();
            (snapshot, oracle_evidence)
        };

        if let Some(evidence) = oracle_evidence {
            self.bus.emit(&Event::DisputeEvidence {
                dispute_id: dispute.id.clone(),
                evidence,
            });
        }
        info!(
            dispute_id = %resolved.id,
            verdict = ?resolved.resolution.as_ref().map(|r| r.verdict),
            deviation_percent = resolved.deviation_percent,
            "dispute resolved"
        );
        self.bus.emit(&Event::DisputeResolved {
            dispute: resolved.clone(),
        });

        // ── Slashing ──────────────────────────────────────────────────────────
        // Strictly after resolution is committed; failure never reopens. No
        // de-duplication happens here: a repeat call is safe only because the
        // adapter contract is idempotent under (escrow_id, reason).
        let mut final_snapshot = resolved;
        let client_wins = matches!(
            final_snapshot.resolution.as_ref().map(|r| r.verdict),
            Some(Verdict::ClientWins)
        );
        if client_wins && self.config.enable_real_slashing {
            let slash_amount =
                compute_slash_amount(escrow_account.amount, self.config.slash_percentage);
            let recipient = self
                .config
                .platform_wallet
                .clone()
                .unwrap_or_else(|| final_snapshot.client.clone());
            match self
                .escrow
                .slash(
                    &request.escrow_id,
                    slash_amount,
                    &recipient,
                    "dispute resolved against provider",
                )
                .await
            {
                Ok(receipt) => {
                    let mut inner = self.inner.lock().await;
                    let d = inner
                        .disputes
                        .get_mut(&final_snapshot.id)
                        .expect("dispute present");
                    d.slashing_record = Some(SlashingRecord {
                        tx_ref: receipt.tx_ref,
                        block_number: receipt.block_number,
                        explorer_url: receipt.explorer_url,
                        slashed_amount: receipt.slashed_amount,
                        recipient: receipt.recipient,
                        executed_at: receipt.executed_at,
                    });
                    final_snapshot = d.clone();
                    inner.counters.slashes_executed += 1;
                    info!(
                        dispute_id = %final_snapshot.id,
                        slashed = slash_amount,
                        "escrow slashed"
                    );
                }
                Err(e) => {
                    let mut inner = self.inner.lock().await;
                    inner.counters.slash_failures += 1;
                    warn!(
                        dispute_id = %final_snapshot.id,
                        error = %e,
                        "escrow slash failed; dispute remains resolved"
                    );
                }
            }
        }

        Ok(final_snapshot)
    }

    // ── Expiry ────────────────────────────────────────────────────────────────

    /// Expire unresolved disputes older than the evidence timeout. Returns
    /// how many transitioned.
    pub async fn expire_stale(&self) -> usize {
        let now = self.clock.now_ms();
        let timeout = self.config.evidence_timeout_ms as i64;
        let mut expired = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            for dispute in inner.disputes.values_mut() {
                let stale = !dispute.status.is_resolved()
                    && dispute.status != DisputeStatus::Expired
                    && dispute.created_at + timeout <= now;
                if stale {
                    dispute.status = DisputeStatus::Expired;
                    expired.push(dispute.id.clone());
                }
            }
            inner.counters.expired += expired.len() as u64;
        }
        for id in &expired {
            warn!(dispute_id = %id, "dispute expired without a verdict");
            self.bus.emit(&Event::DisputeExpired {
                dispute_id: id.clone(),
            });
        }
        expired.len()
    }
}

/// Integer slash arithmetic: the percentage is folded to basis points so
/// money never passes through float.
fn compute_slash_amount(escrow_amount: Amount, slash_percentage: f64) -> Amount {
    let bps = (slash_percentage * 10_000.0).round() as u128;
    ((escrow_amount as u128) * bps / 10_000) as Amount
}

// ── Tests ─────────────────────────────────────────────────────────────────────
