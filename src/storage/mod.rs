//! Storage Module
//!
//! This module provides storage abstractions for the relay service: the
//! client for the durable transfer ledger (an external document store) and
//! the processed-intent dedup set layered on top of it.

pub mod ledger;
pub mod processed;

// Re-export for convenience
pub use ledger::{BridgeStatus, LedgerClient, StatusUpdate, TransferRecord};
pub use processed::ProcessedSet;
