//! Escrow adapter interface.
//!
//! Escrow records are owned by an external settlement layer; the core only
//! knows an escrow id and asks the adapter to slash a portion of it. Slashes
//! are idempotent under (escrow_id, reason): a repeat call returns the
//! original receipt and never debits twice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::SynapseError;
use crate::types::{Address, Amount, TimestampMs};

/// Snapshot of an escrow account, as the adapter reports it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub id: String,
    /// Remaining escrowed balance, micro-USDC.
    pub amount: Amount,
    pub owner: Address,
}

/// Receipt returned by a successful slash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashReceipt {
    pub tx_ref: String,
    pub block_number: Option<u64>,
    pub explorer_url: Option<String>,
    pub slashed_amount: Amount,
    pub recipient: Address,
    pub executed_at: TimestampMs,
}

/// External collaborator that owns escrow balances.
///
/// Implementations MUST be idempotent under (escrow_id, reason): a repeat
/// `slash` with the same key returns the receipt of the first execution and
/// leaves the balance untouched. The dispute resolver relies on this and
/// performs no de-duplication of its own.
#[async_trait]
pub trait EscrowAdapter: Send + Sync {
    /// Look up an escrow; `None` when the id is unknown.
    async fn get(&self, escrow_id: &str) -> Option<EscrowAccount>;

    /// Transfer `amount` out of the escrow toward `recipient`.
    async fn slash(
        &self,
        escrow_id: &str,
        amount: Amount,
        recipient: &Address,
        reason: &str,
    ) -> Result<SlashReceipt, SynapseError>;
}

// ── In-memory adapter ────────────────────────────────────────────────────────

/// Process-local escrow ledger for demos and tests. A slash debits the
/// balance once and caches its receipt under (escrow_id, reason); repeat
/// calls with the same key get the cached receipt back.
pub struct InMemoryEscrow {
    accounts: Mutex<HashMap<String, EscrowAccount>>,
    executed: Mutex<HashMap<(String, String), SlashReceipt>>,
    next_tx: Mutex<u64>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEscrow {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            executed: Mutex::new(HashMap::new()),
            next_tx: Mutex::new(0),
            clock,
        }
    }

    pub fn fund(&self, id: impl Into<String>, owner: Address, amount: Amount) {
        let id = id.into();
        self.accounts.lock().insert(
            id.clone(),
            EscrowAccount {
                id,
                amount,
                owner,
            },
        );
    }
}

#[async_trait]
impl EscrowAdapter for InMemoryEscrow {
    async fn get(&self, escrow_id: &str) -> Option<EscrowAccount> {
        self.accounts.lock().get(escrow_id).cloned()
    }

    async fn slash(
        &self,
        escrow_id: &str,
        amount: Amount,
        recipient: &Address,
        reason: &str,
    ) -> Result<SlashReceipt, SynapseError> {
        let key = (escrow_id.to_string(), reason.to_string());
        if let Some(receipt) = self.executed.lock().get(&key).cloned() {
            return Ok(receipt);
        }

        let receipt = {
            let mut accounts = self.accounts.lock();
            let account = accounts
                .get_mut(escrow_id)
                .ok_or_else(|| SynapseError::EscrowNotFound(escrow_id.to_string()))?;
            if account.amount < amount {
                return Err(SynapseError::SlashFailed(format!(
                    "escrow {} holds {} micro-USDC, cannot slash {}",
                    escrow_id, account.amount, amount
                )));
            }
            account.amount -= amount;

            let mut next = self.next_tx.lock();
            *next += 1;
            SlashReceipt {
                tx_ref: format!("slash_{:08x}", *next),
                block_number: None,
                explorer_url: None,
                slashed_amount: amount,
                recipient: recipient.clone(),
                executed_at: self.clock.now_ms(),
            }
        };
        self.executed.lock().insert(key, receipt.clone());
        Ok(receipt)
    }
}
