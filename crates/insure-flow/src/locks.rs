//! # Per-Version Proposal Locks
//!
//! At most one protocol instance per node may hold an uncommitted proposal
//! against a given policy version. A [`VersionLease`] is that claim; it is
//! released on drop, and the registry entry is removed once no other
//! instance is waiting on it.

use std::sync::Arc;

use dashmap::DashMap;
use insure_contract::StateRef;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::ConflictPolicy;
use crate::error::FlowError;

type Registry = DashMap<StateRef, Arc<Mutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct VersionLocks {
    inner: Arc<Registry>,
}

/// Exclusive claim on one version. Dropping it releases the claim.
#[derive(Debug)]
pub struct VersionLease {
    key: StateRef,
    registry: Arc<Registry>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl VersionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: StateRef) -> Arc<Mutex<()>> {
        self.inner.entry(key).or_default().clone()
    }

    /// Claim `key`, waiting or failing per `policy`.
    pub async fn acquire(&self, key: StateRef, policy: ConflictPolicy) -> Result<VersionLease, FlowError> {
        match policy {
            ConflictPolicy::Serialize => {
                let guard = self.slot(key).lock_owned().await;
                Ok(self.lease(key, guard))
            }
            ConflictPolicy::Reject => self.try_acquire(key),
        }
    }

    /// Claim `key` without waiting.
    pub fn try_acquire(&self, key: StateRef) -> Result<VersionLease, FlowError> {
        let guard = self
            .slot(key)
            .try_lock_owned()
            .map_err(|_| FlowError::ConflictingProposal(key))?;
        Ok(self.lease(key, guard))
    }

    fn lease(&self, key: StateRef, guard: OwnedMutexGuard<()>) -> VersionLease {
        VersionLease {
            key,
            registry: Arc::clone(&self.inner),
            guard: Some(guard),
        }
    }

    /// Number of versions with a live or awaited claim.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl VersionLease {
    pub fn key(&self) -> StateRef {
        self.key
    }
}

impl Drop for VersionLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the registry still holds the slot: nobody is waiting on it.
        self.registry
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insure_contract::{Command, Transition, TransitionKind};
    use insure_core::{Amount, Currency, Timestamp};
    use insure_crypto::{KeyPair, Party};
    use insure_state::Policy;
    use std::time::Duration;

    fn make_ref(seed: u8) -> StateRef {
        let client = Party::new("c", KeyPair::from_seed(&[seed; 32]).public_key());
        let underwriter = Party::new("u", KeyPair::from_seed(&[seed + 1; 32]).public_key());
        let policy = Policy::issue(
            "x",
            Amount::new(1, Currency::cad()),
            client,
            underwriter,
            Timestamp::now(),
        );
        let tx = Transition {
            contract: "insure.policy.v1".into(),
            command: Command::new(TransitionKind::Issue, policy.owning_keys()),
            consumed: None,
            produced: policy,
            payments: vec![],
            time_window: None,
            nonce: uuid::Uuid::new_v4(),
        };
        tx.produced_ref().unwrap()
    }

    #[tokio::test]
    async fn test_reject_policy_fails_while_held() {
        let locks = VersionLocks::new();
        let key = make_ref(1);
        let lease = locks.acquire(key, ConflictPolicy::Reject).await.unwrap();
        assert!(matches!(
            locks.acquire(key, ConflictPolicy::Reject).await,
            Err(FlowError::ConflictingProposal(k)) if k == key
        ));
        drop(lease);
        assert!(locks.try_acquire(key).is_ok());
    }

    #[tokio::test]
    async fn test_serialize_policy_waits_for_holder() {
        let locks = VersionLocks::new();
        let key = make_ref(3);
        let lease = locks.acquire(key, ConflictPolicy::Serialize).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(key, ConflictPolicy::Serialize).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_distinct_versions_do_not_conflict() {
        let locks = VersionLocks::new();
        let _a = locks.try_acquire(make_ref(5)).unwrap();
        let _b = locks.try_acquire(make_ref(7)).unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_entry_removed_on_release() {
        let locks = VersionLocks::new();
        let lease = locks.try_acquire(make_ref(9)).unwrap();
        assert_eq!(locks.len(), 1);
        drop(lease);
        assert!(locks.is_empty());
    }
}
