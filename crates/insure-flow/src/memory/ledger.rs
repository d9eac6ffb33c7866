//! In-memory vault and cash balances for one party.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use insure_contract::{SignedTransition, StateAndRef, StateRef, TransitionId};
use insure_core::{Amount, Currency, PolicyId};
use insure_crypto::Party;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::capability::{BalanceCapability, LedgerRecorder, PaymentInstruction, PolicyQuery};
use crate::error::FlowError;

#[derive(Debug, Clone)]
struct VaultEntry {
    version: StateAndRef,
    consumed: bool,
}

#[derive(Debug, Default)]
struct Vault {
    states: HashMap<StateRef, VaultEntry>,
    /// Latest unconsumed version per policy.
    heads: HashMap<PolicyId, StateRef>,
    recorded: HashMap<TransitionId, StateRef>,
    cash: BTreeMap<Currency, u64>,
}

/// One party's view of the ledger.
///
/// Cash promised to an in-flight proposal is held per transition nonce.
/// Holds are taken under the vault write lock and cleared when the
/// transition is recorded, so concurrent proposals can never commit more
/// than the party holds.
#[derive(Debug)]
pub struct MemoryLedger {
    owner: Party,
    vault: RwLock<Vault>,
    holds: DashMap<Uuid, Amount>,
}

impl MemoryLedger {
    pub fn new(owner: Party) -> Self {
        Self {
            owner,
            vault: RwLock::new(Vault::default()),
            holds: DashMap::new(),
        }
    }

    pub fn owner(&self) -> &Party {
        &self.owner
    }

    /// Mint cash to this party out of thin air.
    pub async fn issue_cash(&self, amount: &Amount) -> Result<Amount, FlowError> {
        let mut vault = self.vault.write().await;
        let held = vault.cash.entry(amount.currency.clone()).or_insert(0);
        *held = held.checked_add(amount.quantity).ok_or(insure_core::AmountError::Overflow)?;
        tracing::debug!(owner = %self.owner, amount = %amount, "issued cash");
        Ok(Amount::new(*held, amount.currency.clone()))
    }

    pub async fn balances(&self) -> Vec<Amount> {
        let vault = self.vault.read().await;
        vault
            .cash
            .iter()
            .map(|(currency, q)| Amount::new(*q, currency.clone()))
            .collect()
    }

    /// Total held in `currency` by outstanding spend holds.
    pub fn held(&self, currency: &Currency) -> u64 {
        self.holds
            .iter()
            .filter(|h| h.value().currency == *currency)
            .map(|h| h.value().quantity)
            .fold(0u64, u64::saturating_add)
    }

    fn spendable(&self, vault: &Vault, currency: &Currency) -> Amount {
        let owned = vault.cash.get(currency).copied().unwrap_or(0);
        Amount::new(owned.saturating_sub(self.held(currency)), currency.clone())
    }

    /// Every unconsumed policy version, ordered by policy id.
    pub async fn unconsumed_policies(&self) -> Vec<StateAndRef> {
        let vault = self.vault.read().await;
        let mut heads: Vec<_> = vault
            .heads
            .values()
            .filter_map(|r| vault.states.get(r))
            .map(|e| e.version.clone())
            .collect();
        heads.sort_by_key(|s| s.state.id);
        heads
    }
}

#[async_trait]
impl PolicyQuery for MemoryLedger {
    async fn find_unconsumed_by_id(&self, id: &PolicyId) -> Result<StateAndRef, FlowError> {
        let vault = self.vault.read().await;
        vault
            .heads
            .get(id)
            .and_then(|r| vault.states.get(r))
            .filter(|e| !e.consumed)
            .map(|e| e.version.clone())
            .ok_or(FlowError::NotFound(*id))
    }

    async fn find_by_ref(&self, reference: &StateRef) -> Result<Option<StateAndRef>, FlowError> {
        let vault = self.vault.read().await;
        Ok(vault.states.get(reference).map(|e| e.version.clone()))
    }
}

#[async_trait]
impl BalanceCapability for MemoryLedger {
    async fn balance_of(&self, currency: &Currency) -> Result<Amount, FlowError> {
        let vault = self.vault.read().await;
        Ok(self.spendable(&vault, currency))
    }

    async fn generate_spend(
        &self,
        amount: &Amount,
        payee: &Party,
        hold: Uuid,
    ) -> Result<PaymentInstruction, FlowError> {
        // Write lock: check and hold as one step.
        let vault = self.vault.write().await;
        let available = self.spendable(&vault, &amount.currency);
        let remaining = available
            .checked_sub(amount)
            .map_err(|_| FlowError::InsufficientFunds {
                needed: amount.clone(),
                available: available.clone(),
            })?;
        self.holds.insert(hold, amount.clone());
        tracing::debug!(owner = %self.owner, amount = %amount, hold = %hold, "holding funds for proposal");
        Ok(PaymentInstruction {
            output: insure_contract::PaymentOutput {
                amount: amount.clone(),
                payer: self.owner.clone(),
                payee: payee.clone(),
            },
            remaining,
        })
    }

    fn release(&self, hold: &Uuid) {
        if let Some((_, amount)) = self.holds.remove(hold) {
            tracing::debug!(owner = %self.owner, amount = %amount, hold = %hold, "released held funds");
        }
    }
}

#[async_trait]
impl LedgerRecorder for MemoryLedger {
    async fn record(&self, stx: &SignedTransition) -> Result<StateAndRef, FlowError> {
        let id = stx.id()?;
        let produced_ref = stx.tx.produced_ref()?;
        let mut vault = self.vault.write().await;

        if let Some(existing) = vault.recorded.get(&id).and_then(|r| vault.states.get(r)) {
            return Ok(existing.version.clone());
        }

        // Validate every cash movement before mutating anything.
        let mut cash = vault.cash.clone();
        for payment in &stx.tx.payments {
            let held = cash.entry(payment.amount.currency.clone()).or_insert(0);
            if payment.payer == self.owner {
                *held = held.checked_sub(payment.amount.quantity).ok_or_else(|| {
                    FlowError::Ledger(format!(
                        "recording {} would overdraw {} by {}",
                        id.short(),
                        self.owner,
                        payment.amount
                    ))
                })?;
            }
            if payment.payee == self.owner {
                *held = held
                    .checked_add(payment.amount.quantity)
                    .ok_or(insure_core::AmountError::Overflow)?;
            }
        }
        vault.cash = cash;
        self.holds.remove(&stx.tx.nonce);

        if let Some(input) = stx.tx.consumed_ref() {
            if let Some(entry) = vault.states.get_mut(&input) {
                entry.consumed = true;
            }
        }

        let version = StateAndRef {
            state: stx.tx.produced.clone(),
            reference: produced_ref,
        };
        vault.states.insert(
            produced_ref,
            VaultEntry {
                version: version.clone(),
                consumed: false,
            },
        );
        vault.heads.insert(version.state.id, produced_ref);
        vault.recorded.insert(id, produced_ref);

        tracing::debug!(
            owner = %self.owner,
            policy_id = %version.state.id,
            transition_id = %id.short(),
            "recorded finalized transition"
        );
        Ok(version)
    }
}
