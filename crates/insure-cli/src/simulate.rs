//! # Simulate Subcommand
//!
//! Runs a client node and an underwriter node in one process over the
//! in-memory network and oracle, then walks one policy through its life:
//!
//! 1. both parties self-issue cash
//! 2. the client issues the policy, paying the premium
//! 3. the underwriter settles a claim
//! 4. the underwriter tries to settle again and is refused
//!
//! Amounts are in minor units (cents). The result of every step is printed
//! as one JSON document.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use insure_core::{Amount, Currency};
use insure_crypto::{EnvKeyProvider, KeyProvider, LocalKeyProvider};
use insure_flow::memory::{MemoryNetwork, MemoryOracle};
use insure_flow::{Finality, FlowError, PartyNode};
use serde_json::{json, Value};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Premium paid by the client, in minor units.
    #[arg(long, default_value_t = 100_000)]
    pub premium: u64,

    /// Claim paid by the underwriter, in minor units.
    #[arg(long, default_value_t = 50_000)]
    pub claim: u64,

    /// Currency code; defaults to the configured currency.
    #[arg(long)]
    pub currency: Option<String>,

    /// Label of the insured.
    #[arg(long, default_value = "alice")]
    pub user: String,

    /// Cash each party starts with, in minor units.
    #[arg(long, default_value_t = 1_000_000)]
    pub starting_cash: u64,

    /// Path to a YAML flow configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Environment variable holding the client's hex seed (random key if unset).
    #[arg(long, value_name = "VAR")]
    pub client_key_env: Option<String>,

    /// Environment variable holding the underwriter's hex seed (random key if unset).
    #[arg(long, value_name = "VAR")]
    pub underwriter_key_env: Option<String>,
}

fn key_provider(var: Option<&str>) -> anyhow::Result<Arc<dyn KeyProvider>> {
    let provider: Arc<dyn KeyProvider> = match var {
        Some(var) => Arc::new(EnvKeyProvider::from_env(var)?),
        None => Arc::new(LocalKeyProvider::generate()),
    };
    Ok(provider)
}

fn finality_json(f: &Finality) -> Value {
    json!({
        "status": "finalized",
        "transition_id": f.transition_id.to_string(),
        "order": f.order,
        "policy": f.produced.state,
    })
}

fn failure_json(e: &FlowError) -> Value {
    json!({ "status": "rejected", "error": e.to_string() })
}

async fn party_json(node: &PartyNode) -> Value {
    json!({
        "name": node.party().name,
        "key": node.party().key.to_hex(),
        "balances": node.balances().await,
        "policies": node.policies().await.iter().map(|p| &p.state).collect::<Vec<_>>(),
    })
}

pub async fn run_simulate(args: &SimulateArgs) -> anyhow::Result<u8> {
    let config = crate::load_config(args.config.as_deref())?;
    let currency = match &args.currency {
        Some(code) => code.parse::<Currency>()?,
        None => config.default_currency.clone(),
    };
    let amount = |q: u64| Amount::new(q, currency.clone());

    let network = MemoryNetwork::new();
    let oracle = Arc::new(MemoryOracle::new());
    let client = PartyNode::join(
        "Client",
        key_provider(args.client_key_env.as_deref())?,
        config.clone(),
        &network,
        oracle.clone(),
    );
    let underwriter = PartyNode::join(
        "Underwriter",
        key_provider(args.underwriter_key_env.as_deref())?,
        config,
        &network,
        oracle,
    );
    let _client_loop = client.start();
    let _underwriter_loop = underwriter.start();

    client.self_issue_cash(&amount(args.starting_cash)).await?;
    underwriter.self_issue_cash(&amount(args.starting_cash)).await?;

    tracing::info!(premium = args.premium, user = %args.user, "issuing policy");
    let issue = client
        .issue_policy(&args.user, amount(args.premium), underwriter.party())
        .await?;
    let policy_id = issue.produced.state.id;

    tracing::info!(policy_id = %policy_id, claim = args.claim, "settling claim");
    let settle = underwriter.settle_policy(policy_id, amount(args.claim)).await;
    let resettle = underwriter.settle_policy(policy_id, amount(args.claim)).await;

    let report = json!({
        "issue": finality_json(&issue),
        "settle": settle.as_ref().map(finality_json).unwrap_or_else(failure_json),
        "second_settle": resettle.as_ref().map(finality_json).unwrap_or_else(failure_json),
        "client": party_json(&client).await,
        "underwriter": party_json(&underwriter).await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if settle.is_ok() && matches!(resettle, Err(FlowError::AlreadySettled { .. })) {
        0
    } else {
        1
    })
}
