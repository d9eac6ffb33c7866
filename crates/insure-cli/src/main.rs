//! # insure CLI entry point
//!
//! Parses command-line arguments, installs the tracing subscriber and
//! dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use insure_cli::keygen::{run_keygen, KeygenArgs};
use insure_cli::simulate::{run_simulate, SimulateArgs};
use insure_cli::validate::{run_validate, ValidateArgs};

/// Two-party insurance policy ledger.
///
/// Simulates the issue/settle protocol between a client and an underwriter,
/// validates transitions offline, and generates signing keys.
#[derive(Parser, Debug)]
#[command(name = "insure", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    /// Ignored when RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the issue and settle protocol between two in-process nodes.
    Simulate(SimulateArgs),

    /// Validate a JSON transition against the contract rules.
    Validate(ValidateArgs),

    /// Generate an Ed25519 signing key.
    Keygen(KeygenArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(&args).await,
        Commands::Validate(args) => run_validate(&args),
        Commands::Keygen(args) => run_keygen(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
