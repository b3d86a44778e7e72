//! Intent Submitter Module
//!
//! Takes a confirmed intent, signs its attestation digest, and submits it to
//! the destination chain's message inbox as a pending message. The submitter
//! is the single place where an intent crosses chains, so it also owns the
//! dedup and transfer-record bookkeeping around that crossing.
//!
//! The submitter never loop-retries. Transient failures propagate to the
//! caller (the watcher's per-intent retry or the backlog reconciler), which
//! decides when to try again. A duplicate revert from the inbox is success:
//! the message is on chain, only our bookkeeping was behind.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::DirectionStatus;
use crate::chain_client::{word_from_hash, AbiToken, ChainClient, ChainError};
use crate::crypto::{attestation_digest, CryptoService};
use crate::storage::{BridgeStatus, LedgerClient, ProcessedSet, StatusUpdate};
use crate::types::Intent;

/// Inbox entry point for pending messages.
const SUBMIT_PENDING_SIG: &str =
    "submitPending(uint64,uint64,address,uint256,address,bytes32,bytes)";

/// Result of pushing one intent through the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Fresh submission; the inbox now holds a pending message
    Submitted {
        /// Relay transaction hash on the destination chain
        tx_hash: String,
    },
    /// The intent was already relayed (dedup hit or duplicate revert)
    AlreadyProcessed,
}

/// Signs and submits confirmed intents for one relay direction.
pub struct Submitter {
    /// Direction label for log lines, e.g. "a_to_b"
    direction: String,
    /// Destination chain client
    dest: Arc<ChainClient>,
    /// Attestation signer
    signer: Arc<CryptoService>,
    /// Dedup set for this direction
    processed: Arc<ProcessedSet>,
    /// Durable transfer ledger, when configured
    ledger: Option<Arc<LedgerClient>>,
    /// Message inbox address on the destination chain
    inbox_addr: String,
    /// Direction counters
    status: Arc<DirectionStatus>,
}

impl Submitter {
    /// Creates a new submitter.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: &str,
        dest: Arc<ChainClient>,
        signer: Arc<CryptoService>,
        processed: Arc<ProcessedSet>,
        ledger: Option<Arc<LedgerClient>>,
        inbox_addr: &str,
        status: Arc<DirectionStatus>,
    ) -> Self {
        Self {
            direction: direction.to_string(),
            dest,
            signer,
            processed,
            ledger,
            inbox_addr: inbox_addr.to_string(),
            status,
        }
    }

    /// Submits one confirmed intent to the destination inbox.
    ///
    /// # Returns
    ///
    /// * `Ok(SubmitOutcome)` - The intent is on the destination chain
    /// * `Err(ChainError)` - Transient errors are retryable by the caller;
    ///   permanent logic errors have already marked the transfer FAILED
    pub async fn submit(&self, intent: &Intent) -> Result<SubmitOutcome, ChainError> {
        // Durable dedup check. A ledger outage must not stall the pipeline:
        // the inbox's duplicate rejection catches anything this misses.
        match self.processed.check(&intent.intent_hash).await {
            Ok(true) => {
                info!(
                    "[{}] Intent {} already processed, skipping",
                    self.direction, intent.intent_hash
                );
                return Ok(SubmitOutcome::AlreadyProcessed);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    "[{}] Durable dedup check failed for intent {}: {:#}; relying on inbox duplicate rejection",
                    self.direction, intent.intent_hash, e
                );
            }
        }

        // Expiry 0 means unknown (ledger-reconstructed intents); the inbox
        // enforces expiry regardless.
        let now = chrono::Utc::now().timestamp() as u64;
        if intent.expiry != 0 && intent.expiry < now {
            let err = ChainError::Reverted(format!(
                "intent {} expired at {} (now {})",
                intent.intent_hash, intent.expiry, now
            ));
            self.mark_failed(intent, "intent expired before submission")
                .await;
            self.status.record_failed();
            return Err(err);
        }

        let digest =
            attestation_digest(intent).map_err(|e| ChainError::Reverted(format!("{:#}", e)))?;
        let signature = self
            .signer
            .sign_attestation(&digest)
            .map_err(|e| ChainError::Reverted(format!("{:#}", e)))?;

        let tokens = [
            AbiToken::Uint(intent.src_chain_id as u128),
            AbiToken::Uint(intent.dst_chain_id as u128),
            AbiToken::Address(intent.token.clone()),
            AbiToken::Uint(intent.amount),
            AbiToken::Address(intent.recipient.clone()),
            AbiToken::FixedBytes(word_from_hash(&intent.intent_hash)?),
            AbiToken::Bytes(signature),
        ];

        match self
            .dest
            .send_function(&self.inbox_addr, SUBMIT_PENDING_SIG, &tokens)
            .await
        {
            Ok(receipt) => {
                self.processed.insert(&intent.intent_hash).await;
                self.status.record_submitted();
                self.mark_submitted(intent, Some(&receipt.transaction_hash), None)
                    .await;
                info!(
                    "[{}] Submitted intent {} to inbox, tx {}",
                    self.direction, intent.intent_hash, receipt.transaction_hash
                );
                Ok(SubmitOutcome::Submitted {
                    tx_hash: receipt.transaction_hash,
                })
            }
            Err(ChainError::Duplicate(reason)) => {
                // The message already exists on the destination; bookkeeping
                // was behind (crash between broadcast and record update, or
                // another path got there first).
                self.processed.insert(&intent.intent_hash).await;
                self.status.record_duplicate();
                self.mark_submitted(
                    intent,
                    None,
                    Some("message already present on destination inbox"),
                )
                .await;
                info!(
                    "[{}] Intent {} already on destination ({}), treating as success",
                    self.direction, intent.intent_hash, reason
                );
                Ok(SubmitOutcome::AlreadyProcessed)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                self.mark_failed(intent, &format!("submission reverted: {}", e))
                    .await;
                self.status.record_failed();
                Err(e)
            }
        }
    }

    /// Moves the transfer record to SUBMITTED. Bookkeeping failures after a
    /// successful chain call are logged, not propagated: the broadcast is
    /// not revocable, and the backlog reconciler repairs the record later.
    async fn mark_submitted(&self, intent: &Intent, tx_hash: Option<&str>, note: Option<&str>) {
        let Some(ref ledger) = self.ledger else {
            return;
        };
        let mut update = StatusUpdate::new(vec![BridgeStatus::Pending], BridgeStatus::Submitted);
        if let Some(tx_hash) = tx_hash {
            update = update.with_tx_hash(tx_hash);
        }
        if let Some(note) = note {
            update = update.with_note(note);
        }
        if let Err(e) = ledger
            .update_by_intent_hash(&intent.intent_hash, &update)
            .await
        {
            warn!(
                "[{}] Failed to mark intent {} SUBMITTED in ledger: {:#}",
                self.direction, intent.intent_hash, e
            );
        }
    }

    /// Moves the transfer record to FAILED after a permanent logic failure.
    async fn mark_failed(&self, intent: &Intent, note: &str) {
        let Some(ref ledger) = self.ledger else {
            return;
        };
        let update = StatusUpdate::new(vec![BridgeStatus::Pending], BridgeStatus::Failed)
            .with_note(note);
        if let Err(e) = ledger
            .update_by_intent_hash(&intent.intent_hash, &update)
            .await
        {
            warn!(
                "[{}] Failed to mark intent {} FAILED in ledger: {:#}",
                self.direction, intent.intent_hash, e
            );
        }
    }
}
