//! Get Relayer Ethereum Address
//!
//! This binary reads the relay configuration, loads the attestation key from
//! the configured environment variable, and prints the derived Ethereum
//! address. The message inbox contracts must be deployed with this address
//! as their trusted relayer.

use anyhow::Result;
use trusted_relay::config::Config;
use trusted_relay::crypto::CryptoService;

fn main() -> Result<()> {
    // Load config
    let config = Config::load()?;

    // Create crypto service
    let crypto = CryptoService::new(&config)?;

    // Print the Ethereum address derived from the attestation key
    println!("{}", crypto.relayer_address());

    Ok(())
}
