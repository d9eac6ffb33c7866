//! # Validate Subcommand
//!
//! Runs the transition validator over a JSON-encoded `Transition` and
//! prints the verdict. Exit code 0 when the transition is valid, 1 when it
//! is rejected.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use insure_contract::{Transition, TransitionValidator};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to a JSON transition.
    pub file: PathBuf,

    /// Path to a YAML flow configuration (for the contract id).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run_validate(args: &ValidateArgs) -> anyhow::Result<u8> {
    let config = crate::load_config(args.config.as_deref())?;
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let tx: Transition = serde_json::from_str(&raw)
        .with_context(|| format!("parsing transition from {}", args.file.display()))?;

    let verdict = verdict(&TransitionValidator::new(config.contract_config()), &tx)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(if verdict["valid"] == serde_json::Value::Bool(true) { 0 } else { 1 })
}

fn verdict(validator: &TransitionValidator, tx: &Transition) -> anyhow::Result<serde_json::Value> {
    let transition_id = tx.id()?.to_string();
    Ok(match validator.validate_transition(tx) {
        Ok(kind) => serde_json::json!({
            "valid": true,
            "kind": kind.command_name(),
            "transition_id": transition_id,
        }),
        Err(e) => {
            tracing::info!(transition_id = %transition_id, reason = %e, "transition rejected");
            serde_json::json!({
                "valid": false,
                "reason": e.to_string(),
                "transition_id": transition_id,
            })
        }
    })
}
