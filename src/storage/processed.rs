//! Processed-Intent Dedup Set
//!
//! Each relay direction owns one of these. The local set answers the fast
//! path; the durable ledger answers it after a restart, when the local set
//! is empty but a transfer may already have been relayed. Contract-level
//! duplicate rejection remains the second line of defense, so a stale miss
//! here degrades to a harmless duplicate revert rather than a double-credit.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ledger::LedgerClient;
use crate::types::normalize_hex;

/// Dedup ledger keyed by intent hash.
pub struct ProcessedSet {
    /// Intents this process has seen submitted
    local: RwLock<HashSet<String>>,
    /// Durable backing, when the ledger is configured
    ledger: Option<Arc<LedgerClient>>,
}

impl ProcessedSet {
    /// Creates a new processed set.
    pub fn new(ledger: Option<Arc<LedgerClient>>) -> Self {
        Self {
            local: RwLock::new(HashSet::new()),
            ledger,
        }
    }

    /// Fast-path check against the local set only.
    pub async fn contains(&self, intent_hash: &str) -> bool {
        self.local.read().await.contains(&normalize_hex(intent_hash))
    }

    /// Full check: local set first, then the durable ledger.
    ///
    /// A durable hit is cached locally so the ledger is consulted at most
    /// once per intent per process lifetime.
    pub async fn check(&self, intent_hash: &str) -> Result<bool> {
        let key = normalize_hex(intent_hash);
        if self.local.read().await.contains(&key) {
            return Ok(true);
        }

        if let Some(ref ledger) = self.ledger {
            if ledger.is_intent_processed(&key).await? {
                self.local.write().await.insert(key);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Records an intent as submitted.
    pub async fn insert(&self, intent_hash: &str) {
        self.local.write().await.insert(normalize_hex(intent_hash));
    }

    /// Number of intents recorded locally.
    pub async fn len(&self) -> usize {
        self.local.read().await.len()
    }
}
