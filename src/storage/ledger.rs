//! Durable Transfer Ledger Client
//!
//! Client for the external document store that tracks each transfer's
//! real-world status. The deposit tracker (out of process) creates a record
//! per bridge deposit; the relay moves it through
//! PENDING → SUBMITTED → COMPLETED (or FAILED).
//!
//! Status updates are compare-and-set: the store applies an update only when
//! the record's current status is in the caller-supplied expected set. That
//! is what makes the backlog reconciler safe to run concurrently with the
//! live pipeline.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::types::Intent;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Bridge status of a transfer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BridgeStatus {
    /// Deposit observed, not yet relayed
    Pending,
    /// Relayed to the destination inbox
    Submitted,
    /// Finalized and minted on the destination
    Completed,
    /// Permanently failed; no automatic retry
    Failed,
}

/// One transfer record in the durable ledger.
///
/// The bridge fields (`srcChainId`, `dstChainId`, `token`, `recipient`,
/// `value`) are written by the deposit tracker at deposit time; they are
/// what lets the backlog reconciler rebuild the intent and recompute its
/// digest without the source chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Document id (transaction identifier)
    pub id: String,
    /// Record type; the relay only touches "Bridge"
    #[serde(rename = "type")]
    pub record_type: String,
    /// Depositing account on the source chain
    #[serde(rename = "from_addr", default)]
    pub from_addr: String,
    /// Intent hash assigned by the source ledger (empty until committed)
    #[serde(rename = "intentHash", default)]
    pub intent_hash: String,
    /// Current bridge status
    #[serde(rename = "bridgeStatus")]
    pub bridge_status: BridgeStatus,
    /// Source chain ID
    #[serde(rename = "srcChainId", default)]
    pub src_chain_id: Option<u64>,
    /// Destination chain ID
    #[serde(rename = "dstChainId", default)]
    pub dst_chain_id: Option<u64>,
    /// Token address on the source chain
    #[serde(default)]
    pub token: Option<String>,
    /// Recipient on the destination chain
    #[serde(default)]
    pub recipient: Option<String>,
    /// Transfer amount, decimal string in the asset's smallest unit
    #[serde(default)]
    pub value: Option<String>,
    /// Relay transaction hash on the destination chain
    #[serde(rename = "relayTxHash", default)]
    pub relay_tx_hash: Option<String>,
    /// Unix timestamp of the last relay status change
    #[serde(rename = "relayedAt", default)]
    pub relayed_at: Option<u64>,
    /// Operator-facing note (errors, reclassification reasons)
    #[serde(default)]
    pub note: Option<String>,
}

impl TransferRecord {
    /// Rebuilds the intent this record tracks.
    ///
    /// Requires the bridge fields; a record without them cannot be
    /// resubmitted and the caller leaves it PENDING with a note. Nonce and
    /// expiry are not part of the attestation digest and are not stored in
    /// the ledger; expiry 0 means unknown and skips the local expiry check
    /// (the destination contract still enforces it).
    pub fn to_intent(&self) -> Result<Intent> {
        let missing = |field: &str| anyhow::anyhow!("record {} is missing {}", self.id, field);

        if self.intent_hash.is_empty() {
            return Err(missing("intentHash"));
        }
        let value = self.value.as_ref().ok_or_else(|| missing("value"))?;
        let amount: u128 = value
            .parse()
            .with_context(|| format!("record {} has unparseable value '{}'", self.id, value))?;

        Ok(Intent {
            user: self.from_addr.clone(),
            src_chain_id: self.src_chain_id.ok_or_else(|| missing("srcChainId"))?,
            dst_chain_id: self.dst_chain_id.ok_or_else(|| missing("dstChainId"))?,
            token: self.token.clone().ok_or_else(|| missing("token"))?,
            amount,
            recipient: self.recipient.clone().ok_or_else(|| missing("recipient"))?,
            nonce: 0,
            expiry: 0,
            intent_hash: self.intent_hash.clone(),
        })
    }
}

/// Compare-and-set status update for a transfer record.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    /// Statuses the record may currently be in for the update to apply
    pub expect: Vec<BridgeStatus>,
    /// Status to set
    pub set: BridgeStatus,
    /// Relay transaction hash to attach, if any
    #[serde(rename = "relayTxHash", skip_serializing_if = "Option::is_none")]
    pub relay_tx_hash: Option<String>,
    /// Note to attach, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Unix timestamp of this update
    #[serde(rename = "relayedAt")]
    pub relayed_at: u64,
}

impl StatusUpdate {
    /// Builds an update stamped with the current time.
    pub fn new(expect: Vec<BridgeStatus>, set: BridgeStatus) -> Self {
        Self {
            expect,
            set,
            relay_tx_hash: None,
            note: None,
            relayed_at: chrono::Utc::now().timestamp() as u64,
        }
    }

    /// Attaches a relay transaction hash.
    pub fn with_tx_hash(mut self, tx_hash: &str) -> Self {
        self.relay_tx_hash = Some(tx_hash.to_string());
        self
    }

    /// Attaches an operator-facing note.
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

// ============================================================================
// LEDGER CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the durable ledger's REST API.
pub struct LedgerClient {
    /// HTTP client for making requests
    client: Client,
    /// Base URL of the document store
    base_url: String,
}

impl LedgerClient {
    /// Creates a new ledger client.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Queries all Bridge records stuck in PENDING.
    pub async fn pending_bridge_records(&self) -> Result<Vec<TransferRecord>> {
        let url = format!(
            "{}/records?type=Bridge&bridgeStatus=PENDING",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to query pending bridge records")?
            .error_for_status()
            .context("Ledger rejected pending-records query")?;

        response
            .json()
            .await
            .context("Failed to parse pending bridge records")
    }

    /// Queries records by intent hash.
    pub async fn records_by_intent_hash(&self, intent_hash: &str) -> Result<Vec<TransferRecord>> {
        let url = format!("{}/records?intentHash={}", self.base_url, intent_hash);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to query records by intent hash")?
            .error_for_status()
            .context("Ledger rejected intent-hash query")?;

        response
            .json()
            .await
            .context("Failed to parse records by intent hash")
    }

    /// Durable dedup check: whether any record for this intent hash has
    /// already moved past PENDING.
    pub async fn is_intent_processed(&self, intent_hash: &str) -> Result<bool> {
        let records = self.records_by_intent_hash(intent_hash).await?;
        Ok(records.iter().any(|r| {
            matches!(
                r.bridge_status,
                BridgeStatus::Submitted | BridgeStatus::Completed
            )
        }))
    }

    /// Applies a compare-and-set status update to one record.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Update applied
    /// * `Ok(false)` - CAS conflict: the record's status was not in `expect`
    /// * `Err(anyhow::Error)` - Transport or store failure
    pub async fn update_status(&self, record_id: &str, update: &StatusUpdate) -> Result<bool> {
        let url = format!("{}/records/{}/status", self.base_url, record_id);
        let response = self
            .client
            .post(&url)
            .json(update)
            .send()
            .await
            .with_context(|| format!("Failed to update status of record {}", record_id))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(anyhow::anyhow!(
                "Ledger rejected status update for record {}: {}",
                record_id,
                status
            )),
        }
    }

    /// Applies a status update to every record tracking an intent hash.
    ///
    /// Used by the submitter and finalizer, which know the intent hash but
    /// not the document id. CAS conflicts are logged and skipped; a transfer
    /// that already advanced does not need this update.
    pub async fn update_by_intent_hash(
        &self,
        intent_hash: &str,
        update: &StatusUpdate,
    ) -> Result<()> {
        let records = self.records_by_intent_hash(intent_hash).await?;
        if records.is_empty() {
            warn!(
                "No ledger record found for intent {}; status {:?} not recorded",
                intent_hash, update.set
            );
            return Ok(());
        }

        for record in records {
            if !self.update_status(&record.id, update).await? {
                warn!(
                    "CAS conflict updating record {} (intent {}) to {:?}",
                    record.id, intent_hash, update.set
                );
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
