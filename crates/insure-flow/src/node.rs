//! One party's in-process node: vault, builder and coordinator wired to a
//! shared [`MemoryNetwork`] and [`MemoryOracle`].

use std::sync::Arc;

use insure_contract::StateAndRef;
use insure_core::{Amount, PolicyId};
use insure_crypto::{KeyProvider, Party};
use tokio::task::JoinHandle;

use crate::builder::ProposalBuilder;
use crate::config::FlowConfig;
use crate::coordinator::{Collaborators, CommitmentCoordinator, Finality};
use crate::error::FlowError;
use crate::memory::{MemoryLedger, MemoryNetwork, MemoryOracle};

pub struct PartyNode {
    party: Party,
    ledger: Arc<MemoryLedger>,
    builder: ProposalBuilder,
    coordinator: CommitmentCoordinator,
}

impl PartyNode {
    pub fn join(
        name: &str,
        keys: Arc<dyn KeyProvider>,
        config: FlowConfig,
        network: &MemoryNetwork,
        oracle: Arc<MemoryOracle>,
    ) -> Self {
        let party = Party::new(name, keys.public_key());
        let ledger = Arc::new(MemoryLedger::new(party.clone()));
        let services = Collaborators {
            vault: ledger.clone(),
            cash: ledger.clone(),
            recorder: ledger.clone(),
            oracle,
            transport: Arc::new(network.join(party.key)),
        };
        let builder = ProposalBuilder::new(
            party.clone(),
            config.clone(),
            services.vault.clone(),
            services.cash.clone(),
        );
        let coordinator = CommitmentCoordinator::new(party.clone(), keys, config, services);
        Self {
            party,
            ledger,
            builder,
            coordinator,
        }
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }

    pub fn builder(&self) -> &ProposalBuilder {
        &self.builder
    }

    pub fn coordinator(&self) -> &CommitmentCoordinator {
        &self.coordinator
    }

    /// Start answering proposals from other parties.
    pub fn start(&self) -> JoinHandle<()> {
        self.coordinator.serve()
    }

    pub async fn self_issue_cash(&self, amount: &Amount) -> Result<Amount, FlowError> {
        self.ledger.issue_cash(amount).await
    }

    /// Issue a new policy with this node as the client.
    pub async fn issue_policy(
        &self,
        user: &str,
        premium: Amount,
        underwriter: &Party,
    ) -> Result<Finality, FlowError> {
        let proposal = self
            .builder
            .build_issue(user, premium, self.party.clone(), underwriter.clone())
            .await?;
        self.coordinator.commit(proposal).await
    }

    /// Pay `claim` on a policy this node underwrites.
    pub async fn settle_policy(&self, policy_id: PolicyId, claim: Amount) -> Result<Finality, FlowError> {
        let proposal = self.builder.build_settle(policy_id, claim).await?;
        self.coordinator.commit(proposal).await
    }

    /// Pay `claim` if the reported incident qualifies.
    pub async fn crash_payout(
        &self,
        policy_id: PolicyId,
        claim: Amount,
        incident: &str,
    ) -> Result<Finality, FlowError> {
        let proposal = self.builder.build_payout(policy_id, claim, incident).await?;
        self.coordinator.commit(proposal).await
    }

    pub async fn policies(&self) -> Vec<StateAndRef> {
        self.ledger.unconsumed_policies().await
    }

    pub async fn balances(&self) -> Vec<Amount> {
        self.ledger.balances().await
    }
}
