//! # Keygen Subcommand
//!
//! Prints a fresh Ed25519 public key and the seed that reproduces it. The
//! seed is the format `EnvKeyProvider` reads.

use clap::Args;
use insure_crypto::KeyPair;

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Also print a shell assignment of the seed to this variable.
    #[arg(long, value_name = "VAR")]
    pub export_as: Option<String>,
}

pub fn run_keygen(args: &KeygenArgs) -> anyhow::Result<u8> {
    let key = KeyPair::generate();
    let public_key = key.public_key();
    let seed = key.export_seed_hex();

    let out = serde_json::json!({
        "public_key": public_key.to_hex(),
        "seed": seed,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    if let Some(var) = &args.export_as {
        println!("export {var}={seed}");
    }
    tracing::debug!(public_key = %public_key.short(), "generated signing key");
    Ok(0)
}
