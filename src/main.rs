//! Trusted Relay Service
//!
//! A relay daemon that moves asset-transfer intents between two ledgers
//! under an optimistic-finality security model.
//!
//! ## Overview
//!
//! The relay:
//! 1. Watches each chain's intent store for newly committed intents
//! 2. Attests to confirmed intents with its signing key and submits them to
//!    the other chain's message inbox
//! 3. Finalizes pending messages once their challenge period has elapsed and
//!    triggers the mint/release step
//! 4. Reconciles transfers left in a non-terminal state by earlier failures
//!
//! ## Security Requirements
//!
//! **CRITICAL**: The attestation key authorizes minting on both chains.
//! It is read from the environment at startup and must never appear in the
//! config file or the logs.

use anyhow::Result;
use tracing::info;

use trusted_relay::config::Config;
use trusted_relay::director::RelayDirector;

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point that initializes and runs the relay.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads and validates configuration from the TOML file
/// 3. Builds the full component graph (clients, signer, pipelines)
/// 4. Runs until an interrupt signal, then shuts down gracefully
///
/// Startup errors (missing key, bad config) propagate out and exit the
/// process non-zero before any relay loop starts.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging for debugging and monitoring
    tracing_subscriber::fmt::init();

    info!("Starting Trusted Relay Service");

    // Load configuration from config/relay.toml (fail fast on anything missing)
    let config = Config::load()?;
    info!("Configuration loaded successfully");

    // Build every component up front so wiring errors surface here
    let director = RelayDirector::new(config)?;
    info!("All components initialized successfully");

    // Run the relay (this blocks until shutdown)
    director.run().await?;

    Ok(())
}
