//! In-process ordering oracle.
//!
//! Guarantees uniqueness of consumption: a policy version can be consumed
//! by at most one finalized transition, and a finalized transition id can
//! never be finalized again. Also enforces transition time windows against
//! its own clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use insure_contract::{SignedTransition, StateRef, TransitionId};
use insure_core::Timestamp;
use tokio::sync::Mutex;

use crate::capability::{OracleOutcome, OracleStatus, OrderingOracle};
use crate::error::FlowError;

#[derive(Debug, Default)]
struct Ledger {
    spent: HashMap<StateRef, TransitionId>,
    finalized: HashMap<TransitionId, u64>,
    conflicted: HashMap<TransitionId, TransitionId>,
    next_order: u64,
}

#[derive(Debug, Default)]
pub struct MemoryOracle {
    inner: Mutex<Ledger>,
    clock_offset_secs: AtomicI64,
    submit_delay_ms: AtomicI64,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the oracle's clock relative to wall time.
    pub fn set_clock_offset(&self, secs: i64) {
        self.clock_offset_secs.store(secs, Ordering::SeqCst);
    }

    /// Delay every `submit` reply after the verdict has been recorded, to
    /// model an oracle that decides but answers late.
    pub fn set_submit_delay(&self, delay: Duration) {
        let ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self.submit_delay_ms.store(ms, Ordering::SeqCst);
    }

    fn now(&self) -> Timestamp {
        Timestamp::now().plus_secs(self.clock_offset_secs.load(Ordering::SeqCst))
    }

    /// Number of transitions finalized so far.
    pub async fn finalized_count(&self) -> usize {
        self.inner.lock().await.finalized.len()
    }

    async fn decide(&self, stx: &SignedTransition) -> Result<OracleOutcome, FlowError> {
        let id = stx.id()?;
        let mut ledger = self.inner.lock().await;

        if ledger.finalized.contains_key(&id) {
            ledger.conflicted.insert(id, id);
            return Ok(OracleOutcome::Conflict { spent_by: id });
        }

        if let Some(window) = &stx.tx.time_window {
            if !window.contains(self.now()) {
                return Ok(OracleOutcome::OutsideTimeWindow);
            }
        }

        if let Some(input) = stx.tx.consumed_ref() {
            if let Some(spent_by) = ledger.spent.get(&input).copied() {
                ledger.conflicted.insert(id, spent_by);
                return Ok(OracleOutcome::Conflict { spent_by });
            }
            ledger.spent.insert(input, id);
        }

        ledger.next_order += 1;
        let order = ledger.next_order;
        ledger.finalized.insert(id, order);
        tracing::debug!(transition_id = %id.short(), order, "oracle finalized transition");
        Ok(OracleOutcome::Finalized { order })
    }
}

#[async_trait]
impl OrderingOracle for MemoryOracle {
    async fn submit(&self, stx: &SignedTransition) -> Result<OracleOutcome, FlowError> {
        let outcome = self.decide(stx).await?;
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay.unsigned_abs())).await;
        }
        Ok(outcome)
    }

    async fn status(&self, id: &TransitionId) -> Result<OracleStatus, FlowError> {
        let ledger = self.inner.lock().await;
        if let Some(order) = ledger.finalized.get(id) {
            return Ok(OracleStatus::Finalized { order: *order });
        }
        Ok(match ledger.conflicted.get(id) {
            Some(spent_by) => OracleStatus::Conflicted { spent_by: *spent_by },
            None => OracleStatus::Unknown,
        })
    }
}
