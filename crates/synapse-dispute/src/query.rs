//! Query helpers and statistics over the resolver's dispute ledger.

use serde::Serialize;

use synapse_core::dispute::Dispute;
use synapse_core::types::{Address, DisputeId, IntentId};

use crate::resolver::DisputeResolver;

/// Monitoring snapshot of the dispute ledger.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DisputeStats {
    pub total: u64,
    /// Disputes not yet in a resolved or expired state.
    pub open: usize,
    pub client_wins: u64,
    pub provider_wins: u64,
    pub split: u64,
    pub expired: u64,
    pub slashes_executed: u64,
    pub slash_failures: u64,
    /// Mean deviation over resolved disputes where one was computable.
    pub average_deviation_percent: Option<f64>,
}

impl DisputeResolver {
    pub async fn get_dispute(&self, id: &DisputeId) -> Option<Dispute> {
        self.inner.lock().await.disputes.get(id).cloned()
    }

    /// The dispute for an intent, via the secondary index.
    pub async fn dispute_for_intent(&self, intent_id: &IntentId) -> Option<Dispute> {
        let inner = self.inner.lock().await;
        let id = inner.by_intent.get(intent_id)?;
        inner.disputes.get(id).cloned()
    }

    pub async fn disputes_for_client(&self, client: &Address) -> Vec<Dispute> {
        let mut disputes: Vec<Dispute> = self
            .inner
            .lock()
            .await
            .disputes
            .values()
            .filter(|d| d.client == *client)
            .cloned()
            .collect();
        disputes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        disputes
    }

    pub async fn disputes_for_provider(&self, provider: &Address) -> Vec<Dispute> {
        let mut disputes: Vec<Dispute> = self
            .inner
            .lock()
            .await
            .disputes
            .values()
            .filter(|d| d.provider == *provider)
            .cloned()
            .collect();
        disputes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        disputes
    }

    pub async fn stats(&self) -> DisputeStats {
        let inner = self.inner.lock().await;
        let deviations: Vec<f64> = inner
            .disputes
            .values()
            .filter(|d| d.status.is_resolved())
            .filter_map(|d| d.deviation_percent)
            .collect();
        let average_deviation_percent = if deviations.is_empty() {
            None
        } else {
            Some(deviations.iter().sum::<f64>() / deviations.len() as f64)
        };
        DisputeStats {
            total: inner.counters.opened,
            open: inner
                .disputes
                .values()
                .filter(|d| {
                    !d.status.is_resolved()
                        && d.status != synapse_core::dispute::DisputeStatus::Expired
                })
                .count(),
            client_wins: inner.counters.client_wins,
            provider_wins: inner.counters.provider_wins,
            split: inner.counters.split,
            expired: inner.counters.expired,
            slashes_executed: inner.counters.slashes_executed,
            slash_failures: inner.counters.slash_failures,
            average_deviation_percent,
        }
    }
}
