//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the trusted
//! relay service. Configuration includes chain endpoints, per-direction
//! watcher settings, relayer keys, the durable ledger store, and the
//! operational API. Key material is never stored in the config file; the
//! file names the environment variable that holds it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all service settings.
///
/// This structure holds configuration for:
/// - Both chain endpoints (each acts as source and destination)
/// - Per-direction watcher parameters (A→B and B→A)
/// - Relayer signing key and submission/finalization timing
/// - The durable transfer ledger (optional; backlog recovery requires it)
/// - The operational API server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain A endpoint configuration
    pub chain_a: ChainEndpointConfig,
    /// Chain B endpoint configuration
    pub chain_b: ChainEndpointConfig,
    /// Watcher settings for the A→B direction
    pub a_to_b: DirectionConfig,
    /// Watcher settings for the B→A direction
    pub b_to_a: DirectionConfig,
    /// Relayer-specific configuration (keys, timing)
    pub relayer: RelayerConfig,
    /// Durable ledger store configuration (optional)
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    /// Operational API server configuration
    pub api: ApiConfig,
}

/// Configuration for one chain endpoint.
///
/// Every chain plays both roles: source (intent store watched for committed
/// intents) and destination (message inbox plus settlement contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEndpointConfig {
    /// Human-readable name for the chain
    pub name: String,
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Unique chain identifier
    pub chain_id: u64,
    /// Address of the intent store contract (source role)
    pub intent_store_addr: String,
    /// Address of the message inbox contract (destination role)
    pub inbox_addr: String,
    /// Address of the settlement contract that mints/releases funds
    pub settlement_addr: String,
    /// Operator account the node signs relay transactions with
    pub operator_addr: String,
}

/// Per-direction watcher parameters.
///
/// Confirmation depth and poll interval are deliberately independent per
/// direction; operators should derive them from each source chain's actual
/// finality behavior rather than reuse one value for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionConfig {
    /// Blocks an intent event must be buried under before submission
    pub required_confirmations: u64,
    /// Source-chain polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Bound on waiting for confirmations before deferring to a rescan, in seconds
    pub confirmation_timeout_secs: u64,
    /// First block to scan; defaults to the chain head at startup
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Relayer configuration: attestation key location and submission timing.
///
/// The attestation private key is loaded from an environment variable at
/// runtime. The config file contains the variable name, not the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Environment variable holding the secp256k1 attestation key (hex encoded)
    /// Default: "RELAY_SIGNING_KEY"
    #[serde(default = "default_signing_key_env")]
    pub signing_key_env: String,
    /// Expected Ethereum address of the attestation key (checked at startup when set)
    #[serde(default)]
    pub relayer_addr: Option<String>,
    /// Destination inbox polling interval for the finalizer, in milliseconds
    pub finalize_interval_ms: u64,
    /// How long to wait for a submitted transaction's receipt, in seconds
    pub send_timeout_secs: u64,
}

impl RelayerConfig {
    /// Reads the attestation private key from the configured environment variable.
    pub fn get_signing_key(&self) -> Result<String> {
        std::env::var(&self.signing_key_env).with_context(|| {
            format!(
                "Signing key environment variable '{}' is not set",
                self.signing_key_env
            )
        })
    }
}

fn default_signing_key_env() -> String {
    "RELAY_SIGNING_KEY".to_string()
}

/// Durable transfer ledger (external document store) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL of the document store's REST API
    pub base_url: String,
    /// Interval for scheduled backlog reconciliation, in milliseconds.
    /// Unset means backlog runs only on demand via the reconcile_backlog binary.
    #[serde(default)]
    pub backlog_interval_ms: Option<u64>,
    /// Pause between backlog records to avoid overloading the destination chain
    #[serde(default = "default_backlog_rate_limit_ms")]
    pub backlog_rate_limit_ms: u64,
}

fn default_backlog_rate_limit_ms() -> u64 {
    500
}

/// Operational API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host address to bind the API server to
    pub host: String,
    /// Port number to bind the API server to
    pub port: u16,
}

// ============================================================================
// CONFIGURATION LOADING AND VALIDATION
// ============================================================================

impl Config {
    /// Loads configuration from the TOML file.
    ///
    /// The path defaults to `config/relay.toml` and can be overridden with
    /// the `RELAY_CONFIG_PATH` environment variable (used by tests). The
    /// loaded configuration is validated before being returned, so a missing
    /// contract address, unset key variable, or zero interval fails startup
    /// instead of surfacing mid-relay.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("RELAY_CONFIG_PATH").unwrap_or_else(|_| "config/relay.toml".to_string());

        if !std::path::Path::new(&config_path).exists() {
            return Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/relay.template.toml config/relay.toml\n\
                Then edit config/relay.toml with your actual values.",
                config_path
            ));
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file '{}'", config_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", config_path))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, failing fast on anything the relay
    /// cannot run without.
    pub fn validate(&self) -> Result<()> {
        for chain in [&self.chain_a, &self.chain_b] {
            url::Url::parse(&chain.rpc_url)
                .with_context(|| format!("Invalid RPC URL for chain '{}'", chain.name))?;
            for (label, addr) in [
                ("intent_store_addr", &chain.intent_store_addr),
                ("inbox_addr", &chain.inbox_addr),
                ("settlement_addr", &chain.settlement_addr),
                ("operator_addr", &chain.operator_addr),
            ] {
                if !is_address(addr) {
                    return Err(anyhow::anyhow!(
                        "Chain '{}': {} '{}' is not a 20-byte hex address",
                        chain.name,
                        label,
                        addr
                    ));
                }
            }
        }

        if self.chain_a.chain_id == self.chain_b.chain_id {
            return Err(anyhow::anyhow!(
                "chain_a and chain_b must have distinct chain IDs (both are {})",
                self.chain_a.chain_id
            ));
        }

        for (label, dir) in [("a_to_b", &self.a_to_b), ("b_to_a", &self.b_to_a)] {
            if dir.required_confirmations == 0 {
                return Err(anyhow::anyhow!(
                    "Direction {}: required_confirmations must be at least 1",
                    label
                ));
            }
            if dir.poll_interval_ms == 0 || dir.confirmation_timeout_secs == 0 {
                return Err(anyhow::anyhow!(
                    "Direction {}: poll_interval_ms and confirmation_timeout_secs must be non-zero",
                    label
                ));
            }
        }

        if self.relayer.finalize_interval_ms == 0 || self.relayer.send_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "relayer.finalize_interval_ms and relayer.send_timeout_secs must be non-zero"
            ));
        }

        // The key itself is validated by the crypto service; here we only
        // require that the variable is present so startup fails before any
        // chain connection is opened.
        self.relayer.get_signing_key()?;

        if let Some(ref ledger) = self.ledger {
            url::Url::parse(&ledger.base_url).context("Invalid ledger base_url")?;
        }

        Ok(())
    }
}

/// Returns true when the string is a 0x-prefixed 20-byte hex address.
fn is_address(value: &str) -> bool {
    match value.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
