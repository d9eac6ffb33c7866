//! # Two-Party Protocol Scenarios
//!
//! End-to-end runs of the commitment protocol between a client node and an
//! underwriter node over the in-memory network, oracle and ledgers.

use std::sync::Arc;
use std::time::Duration;

use insure_contract::{SignedTransition, StateAndRef, TransitionKind, TransitionSignature};
use insure_core::{Amount, Currency};
use insure_crypto::{KeyProvider, LocalKeyProvider, Party};
use insure_flow::memory::{MemoryNetwork, MemoryOracle};
use insure_flow::{
    BalanceCapability, Commitment, ConflictPolicy, FlowConfig, FlowError, OracleOutcome, OrderingOracle,
    PartyNode, ProtocolMessage, Session, SessionTransport,
};
use insure_state::ProtocolState;

const STARTING_CASH: u64 = 1_000_000;

fn cad(q: u64) -> Amount {
    Amount::new(q, Currency::cad())
}

struct World {
    network: MemoryNetwork,
    oracle: Arc<MemoryOracle>,
    client: PartyNode,
    underwriter: PartyNode,
}

async fn world_with(config: FlowConfig, serve_underwriter: bool) -> World {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let network = MemoryNetwork::new();
    let oracle = Arc::new(MemoryOracle::new());
    let client = PartyNode::join(
        "Client",
        Arc::new(LocalKeyProvider::from_seed(&[1; 32])),
        config.clone(),
        &network,
        oracle.clone(),
    );
    let underwriter = PartyNode::join(
        "Underwriter",
        Arc::new(LocalKeyProvider::from_seed(&[2; 32])),
        config,
        &network,
        oracle.clone(),
    );
    client.start();
    if serve_underwriter {
        underwriter.start();
    }
    client.self_issue_cash(&cad(STARTING_CASH)).await.unwrap();
    underwriter.self_issue_cash(&cad(STARTING_CASH)).await.unwrap();

    World {
        network,
        oracle,
        client,
        underwriter,
    }
}

async fn world() -> World {
    world_with(FlowConfig::default(), true).await
}

async fn cash(node: &PartyNode) -> u64 {
    node.ledger().balance_of(&Currency::cad()).await.unwrap().quantity
}

/// Poll `node` until it holds `n` policies or about five seconds pass.
async fn wait_for_policies(node: &PartyNode, n: usize) -> Vec<StateAndRef> {
    for _ in 0..50 {
        let policies = node.policies().await;
        if policies.len() == n {
            return policies;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    node.policies().await
}

async fn issued(w: &World) -> insure_core::PolicyId {
    let finality = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap();
    finality.produced.state.id
}

#[tokio::test]
async fn issue_reaches_finality_on_both_sides() {
    let w = world().await;
    let finality = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap();

    let policy = &finality.produced.state;
    assert_eq!(policy.premium, cad(100_000));
    assert!(policy.claim.is_zero());
    assert_eq!(policy.client, *w.client.party());
    assert_eq!(policy.underwriter, *w.underwriter.party());
    assert_eq!(finality.order, 1);
    assert_eq!(finality.transition.signers(), policy.owning_keys());

    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH + 100_000);
    assert_eq!(w.client.policies().await, vec![finality.produced.clone()]);
    assert_eq!(w.underwriter.policies().await, vec![finality.produced]);
}

#[tokio::test]
async fn settle_moves_claim_to_client() {
    let w = world().await;
    let id = issued(&w).await;

    let finality = w.underwriter.settle_policy(id, cad(50_000)).await.unwrap();
    assert_eq!(finality.produced.state.id, id);
    assert_eq!(finality.produced.state.claim, cad(50_000));
    assert_eq!(finality.produced.state.premium, cad(100_000));

    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000 + 50_000);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH + 100_000 - 50_000);

    let client_view = w.client.policies().await;
    assert_eq!(client_view.len(), 1);
    assert_eq!(client_view[0].state.claim, cad(50_000));
}

#[tokio::test]
async fn crash_payout_settles_and_other_incidents_do_not() {
    let w = world().await;
    let id = issued(&w).await;

    let err = w.underwriter.crash_payout(id, cad(10_000), "X").await.unwrap_err();
    assert!(matches!(err, FlowError::IneligibleClaim(_)));
    assert_eq!(w.oracle.finalized_count().await, 1);

    let finality = w.underwriter.crash_payout(id, cad(10_000), "C").await.unwrap();
    assert_eq!(finality.produced.state.claim, cad(10_000));
}

#[tokio::test]
async fn second_settle_fails_before_signing() {
    let w = world().await;
    let id = issued(&w).await;
    w.underwriter.settle_policy(id, cad(50_000)).await.unwrap();

    let err = w.underwriter.settle_policy(id, cad(1_000)).await.unwrap_err();
    match err {
        FlowError::AlreadySettled { policy_id, claim } => {
            assert_eq!(policy_id, id);
            assert_eq!(claim, cad(50_000));
        }
        other => panic!("expected AlreadySettled, got {other:?}"),
    }
    assert_eq!(w.oracle.finalized_count().await, 2);
    assert_eq!(cash(&w.client).await, STARTING_CASH - 50_000);
}

#[tokio::test]
async fn concurrent_settles_one_wins_one_double_spends() {
    let w = world().await;
    let id = issued(&w).await;

    let first = w.underwriter.builder().build_settle(id, cad(10_000)).await.unwrap();
    let second = w.underwriter.builder().build_settle(id, cad(20_000)).await.unwrap();
    let coordinator = w.underwriter.coordinator();
    let (a, b) = tokio::join!(coordinator.commit(first), coordinator.commit(second));

    let results = [a, b];
    let finalized: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let double_spent = results
        .iter()
        .filter(|r| matches!(r, Err(FlowError::DoubleSpend(_))))
        .count();
    assert_eq!(finalized.len(), 1);
    assert_eq!(double_spent, 1);

    let claim = finalized[0].produced.state.claim.quantity;
    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000 + claim);
    assert_eq!(w.client.policies().await[0].state.claim.quantity, claim);
    assert!(w.underwriter.coordinator().locks().is_empty());
}

#[tokio::test]
async fn reject_policy_refuses_second_local_proposal() {
    let config = FlowConfig {
        conflict_policy: ConflictPolicy::Reject,
        ..FlowConfig::default()
    };
    let w = world_with(config, true).await;
    let id = issued(&w).await;

    let first = w.underwriter.builder().build_settle(id, cad(10_000)).await.unwrap();
    let second = w.underwriter.builder().build_settle(id, cad(20_000)).await.unwrap();
    let version = first.tx.consumed_ref().unwrap();
    let coordinator = w.underwriter.coordinator();
    let (a, b) = tokio::join!(coordinator.commit(first), coordinator.commit(second));

    assert!(a.is_ok());
    assert!(matches!(b, Err(FlowError::ConflictingProposal(v)) if v == version));
}

#[tokio::test]
async fn counterparty_refuses_payment_out_of_its_account() {
    let w = world().await;
    let mut proposal = w
        .client
        .builder()
        .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    let payment = &mut proposal.tx.payments[0];
    std::mem::swap(&mut payment.payer, &mut payment.payee);

    let mut commitment = Commitment::new(proposal);
    let err = w.client.coordinator().drive(&mut commitment).await.unwrap_err();

    assert!(matches!(&err, FlowError::CounterpartyRejected(reason) if reason.contains("responder")));
    assert_eq!(commitment.state(), ProtocolState::Aborted);
    assert!(commitment
        .history()
        .iter()
        .any(|r| r.to == ProtocolState::CounterpartyRejected));
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH);
    assert_eq!(w.oracle.finalized_count().await, 0);
}

#[tokio::test]
async fn counterparty_refuses_tampered_consumed_version() {
    let w = world().await;
    let id = issued(&w).await;

    let mut proposal = w.underwriter.builder().build_settle(id, cad(5_000)).await.unwrap();
    // Consistent on both sides so local validation still passes.
    if let Some(consumed) = proposal.tx.consumed.as_mut() {
        consumed.state.user = "mallory".into();
    }
    proposal.tx.produced.user = "mallory".into();

    let err = w.underwriter.coordinator().commit(proposal).await.unwrap_err();
    assert!(matches!(&err, FlowError::CounterpartyRejected(reason) if reason.contains("local copy")));
    assert_eq!(w.client.policies().await[0].state.user, "alice");
}

#[tokio::test]
async fn local_validation_failure_never_contacts_counterparty() {
    let w = world_with(FlowConfig::default(), false).await;
    let mut proposal = w
        .client
        .builder()
        .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    proposal.tx.produced.premium = cad(0);

    let mut commitment = Commitment::new(proposal);
    let err = w.client.coordinator().drive(&mut commitment).await.unwrap_err();
    assert!(matches!(&err, FlowError::ValidationFailed(reason) if reason.contains("premium")));
    assert_eq!(commitment.state(), ProtocolState::Aborted);
    assert_eq!(commitment.history().len(), 1);
}

#[tokio::test]
async fn silent_counterparty_times_out_without_side_effects() {
    let config = FlowConfig {
        counterparty_timeout_secs: 1,
        ..FlowConfig::default()
    };
    let w = world_with(config, false).await;

    let mut commitment = Commitment::new(
        w.client
            .builder()
            .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
            .await
            .unwrap(),
    );
    let err = w.client.coordinator().drive(&mut commitment).await.unwrap_err();

    assert!(matches!(err, FlowError::Timeout("counterparty")));
    assert_eq!(commitment.state(), ProtocolState::Aborted);
    assert_eq!(cash(&w.client).await, STARTING_CASH);
    assert!(w.client.policies().await.is_empty());
    assert_eq!(w.oracle.finalized_count().await, 0);
}

#[tokio::test]
async fn stranger_signature_is_a_signer_mismatch() {
    let w = world_with(FlowConfig::default(), false).await;

    // Impersonate the underwriter's endpoint and countersign with the wrong key.
    w.network.leave(&w.underwriter.party().key);
    let impostor = w.network.join(w.underwriter.party().key);
    let stranger = LocalKeyProvider::from_seed(&[66; 32]);
    let rogue = tokio::spawn(async move {
        let mut session = impostor.accept().await.unwrap();
        let propose = ProtocolMessage::decode(&session.receive().await.unwrap()).unwrap();
        let ProtocolMessage::Propose { transition } = propose else {
            panic!("expected proposal");
        };
        let payload = insure_contract::signing_payload(&transition.id().unwrap()).unwrap();
        let reply = ProtocolMessage::Signature {
            signature: TransitionSignature {
                by: stranger.public_key(),
                signature: stranger.sign(&payload).unwrap(),
            },
        };
        session.send(reply.encode().unwrap()).await.unwrap();
        ProtocolMessage::decode(&session.receive().await.unwrap()).unwrap()
    });

    let err = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap_err();
    match err {
        FlowError::SignerMismatch { expected, actual } => {
            assert!(expected.contains(&w.underwriter.party().key));
            assert!(actual.contains(&LocalKeyProvider::from_seed(&[66; 32]).public_key()));
        }
        other => panic!("expected SignerMismatch, got {other:?}"),
    }
    assert!(matches!(rogue.await.unwrap(), ProtocolMessage::Aborted { .. }));
    assert_eq!(w.oracle.finalized_count().await, 0);
}

#[tokio::test]
async fn replayed_transition_conflicts_at_the_oracle() {
    let w = world().await;
    let finality = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap();

    let replay = w.oracle.submit(&finality.transition).await.unwrap();
    assert_eq!(
        replay,
        OracleOutcome::Conflict {
            spent_by: finality.transition_id
        }
    );
}

#[tokio::test]
async fn stale_issue_is_outside_time_window() {
    let w = world().await;
    w.oracle.set_clock_offset(3_600);

    let err = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::OutsideTimeWindow));
    assert_eq!(cash(&w.client).await, STARTING_CASH);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH);
}

#[tokio::test]
async fn slow_oracle_outcome_is_recovered_by_polling() {
    let config = FlowConfig {
        oracle_timeout_secs: 1,
        ..FlowConfig::default()
    };
    let w = world_with(config, true).await;
    w.oracle.set_submit_delay(Duration::from_millis(1_500));

    let finality = w
        .client
        .issue_policy("alice", cad(100_000), w.underwriter.party())
        .await
        .unwrap();
    assert_eq!(finality.order, 1);
    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000);
}

#[tokio::test]
async fn dropped_initiator_after_submission_is_recovered_on_both_sides() {
    let w = world().await;
    w.oracle.set_submit_delay(Duration::from_millis(1_000));
    let proposal = w
        .client
        .builder()
        .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    let mut commitment = Commitment::new(proposal);
    let coordinator = w.client.coordinator();

    // Cancel while the oracle has decided but not yet answered.
    let cut = tokio::time::timeout(Duration::from_millis(300), coordinator.drive(&mut commitment)).await;
    assert!(cut.is_err());
    assert_eq!(commitment.state(), ProtocolState::Submitted);
    assert!(commitment.signed().is_some());
    assert_eq!(w.oracle.finalized_count().await, 1);
    assert!(w.client.policies().await.is_empty());
    // The premium stays held while the outcome is pending.
    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000);

    // The underwriter sees the session close and asks the oracle.
    let underwriter_view = wait_for_policies(&w.underwriter, 1).await;
    assert_eq!(underwriter_view.len(), 1);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH + 100_000);

    let finality = coordinator.recover(&mut commitment).await.unwrap();
    assert_eq!(commitment.state(), ProtocolState::Finalized);
    assert_eq!(finality.order, 1);
    assert_eq!(w.client.policies().await, underwriter_view);
    assert_eq!(cash(&w.client).await, STARTING_CASH - 100_000);
    assert_eq!(w.client.ledger().held(&Currency::cad()), 0);
    assert_eq!(w.oracle.finalized_count().await, 1);

    // Nothing left to recover.
    let again = coordinator.recover(&mut commitment).await.unwrap_err();
    assert!(matches!(again, FlowError::Protocol(_)));
}

#[tokio::test]
async fn responder_polls_oracle_when_finality_notice_never_comes() {
    let config = FlowConfig {
        finality_timeout_secs: 1,
        ..FlowConfig::default()
    };
    let w = world_with(config, true).await;
    let proposal = w
        .client
        .builder()
        .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    let mut stx = SignedTransition::unsigned(proposal.tx);
    stx.sign_with(&LocalKeyProvider::from_seed(&[1; 32])).unwrap();

    // A client endpoint that collects the countersignature, submits, and
    // then never sends the finality notice.
    let endpoint = w.network.join(w.client.party().key);
    let mut session = endpoint.open(&w.underwriter.party().key).await.unwrap();
    let propose = ProtocolMessage::Propose {
        transition: stx.clone(),
    };
    session.send(propose.encode().unwrap()).await.unwrap();
    let reply = ProtocolMessage::decode(&session.receive().await.unwrap()).unwrap();
    let ProtocolMessage::Signature { signature } = reply else {
        panic!("expected countersignature");
    };
    stx.add_signature(signature);
    assert!(matches!(
        w.oracle.submit(&stx).await.unwrap(),
        OracleOutcome::Finalized { .. }
    ));

    let ack = tokio::time::timeout(Duration::from_secs(5), session.receive())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ProtocolMessage::decode(&ack).unwrap(), ProtocolMessage::Ack));
    let recorded = w.underwriter.policies().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].state, stx.tx.produced);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH + 100_000);
}

#[tokio::test]
async fn concurrent_issues_cannot_overspend() {
    let w = world().await;
    let premium = 600_000;
    let (a, b) = tokio::join!(
        w.client.issue_policy("alice", cad(premium), w.underwriter.party()),
        w.client.issue_policy("bob", cad(premium), w.underwriter.party()),
    );

    let results = [a, b];
    let finalized = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(FlowError::InsufficientFunds { .. })))
        .count();
    assert_eq!((finalized, refused), (1, 1));
    assert_eq!(w.oracle.finalized_count().await, 1);
    assert_eq!(w.client.policies().await.len(), 1);
    assert_eq!(w.underwriter.policies().await.len(), 1);
    assert_eq!(cash(&w.client).await, STARTING_CASH - premium);
    assert_eq!(cash(&w.underwriter).await, STARTING_CASH + premium);
}

#[tokio::test]
async fn recording_failure_after_finality_does_not_abort() {
    let w = world().await;
    let unfunded = w
        .client
        .builder()
        .build_issue("alice", cad(600_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    w.client.builder().discard(&unfunded);
    w.client
        .issue_policy("bob", cad(600_000), w.underwriter.party())
        .await
        .unwrap();

    let mut commitment = Commitment::new(unfunded);
    let err = w.client.coordinator().drive(&mut commitment).await.unwrap_err();

    assert!(matches!(err, FlowError::NotRecorded { order: 2, .. }));
    assert_eq!(commitment.state(), ProtocolState::Finalized);
    assert_eq!(w.oracle.finalized_count().await, 2);
    assert_eq!(w.underwriter.policies().await.len(), 2);
    assert_eq!(w.client.policies().await.len(), 1);
}

#[tokio::test]
async fn commitment_publishes_every_state() {
    let w = world().await;
    let proposal = w
        .client
        .builder()
        .build_issue("alice", cad(100_000), w.client.party().clone(), w.underwriter.party().clone())
        .await
        .unwrap();
    let mut commitment = Commitment::new(proposal);
    let watcher = commitment.subscribe();
    assert_eq!(*watcher.borrow(), ProtocolState::Built);

    w.client.coordinator().drive(&mut commitment).await.unwrap();

    assert_eq!(*watcher.borrow(), ProtocolState::Finalized);
    let path: Vec<_> = commitment.history().iter().map(|r| r.to).collect();
    assert_eq!(
        path,
        vec![
            ProtocolState::LocallyValidated,
            ProtocolState::LocallySigned,
            ProtocolState::AwaitingCounterparty,
            ProtocolState::CounterpartyValidated,
            ProtocolState::FullySigned,
            ProtocolState::Submitted,
            ProtocolState::Finalized,
        ]
    );

    // Terminal instances cannot be driven again.
    let again = w.client.coordinator().drive(&mut commitment).await.unwrap_err();
    assert!(matches!(again, FlowError::Protocol(_)));
}

#[tokio::test]
async fn only_the_entitled_party_may_initiate() {
    let w = world().await;
    let id = issued(&w).await;

    let err = w.client.builder().build_settle(id, cad(1_000)).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::WrongInitiator {
            kind: TransitionKind::Settle,
            expected: "underwriter"
        }
    ));

    // A proposal built elsewhere is refused by the coordinator too.
    let proposal = w.underwriter.builder().build_settle(id, cad(1_000)).await.unwrap();
    let err = w.client.coordinator().commit(proposal).await.unwrap_err();
    assert!(matches!(err, FlowError::WrongInitiator { .. }));
}

#[tokio::test]
async fn premium_above_balance_is_insufficient_funds() {
    let w = world().await;
    let err = w
        .client
        .issue_policy("alice", cad(STARTING_CASH + 1), w.underwriter.party())
        .await
        .unwrap_err();
    match err {
        FlowError::InsufficientFunds { needed, available } => {
            assert_eq!(needed, cad(STARTING_CASH + 1));
            assert_eq!(available, cad(STARTING_CASH));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_party_route_is_a_transport_error() {
    let w = world().await;
    let ghost = Party::new("Ghost", LocalKeyProvider::from_seed(&[77; 32]).public_key());
    let err = w
        .client
        .issue_policy("alice", cad(100), &ghost)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Transport(_)));
}
