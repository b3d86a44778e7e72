//! Trusted Relay Service Library
//!
//! This crate provides an off-chain relay that moves asset-transfer intents
//! between two ledgers under an optimistic-finality model: watch committed
//! intents on the source chain, attest and submit them to the destination
//! inbox, finalize them after their challenge period, and repair anything
//! that fell through via the durable-ledger backlog.

pub mod api;
pub mod backlog;
pub mod chain_client;
pub mod config;
pub mod crypto;
pub mod director;
pub mod finalizer;
pub mod scheduler;
pub mod storage;
pub mod submitter;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use chain_client::{ChainClient, ChainError};
pub use config::{ApiConfig, ChainEndpointConfig, Config, DirectionConfig, RelayerConfig};
pub use crypto::{attestation_digest, CryptoService};
pub use director::RelayDirector;
pub use finalizer::Finalizer;
pub use submitter::{SubmitOutcome, Submitter};
pub use types::{Intent, Message, MessageState};
pub use watcher::Watcher;
