//! Message Finalizer Module
//!
//! One finalizer runs per destination chain. Each tick it walks the inbox's
//! pending message set, leaves anything still inside its challenge period
//! (or disputed) alone, and settles everything whose period has elapsed with
//! the two-step sequence: `finalize` on the inbox, then `executeMint` on the
//! settlement contract.
//!
//! A failure between the two steps is safe: the message stays in the pending
//! set in FINALIZED state and the next tick retries `executeMint` alone. The
//! mint is guarded on chain, so a retry can at worst hit a duplicate revert,
//! which counts as settled. Errors are scoped to their message hash and
//! retried every tick; nothing is dropped silently.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::FinalizerStatus;
use crate::chain_client::{
    address_from_word, decode_words, hash_from_word, u64_from_word, word_from_hash, AbiToken,
    ChainClient, ChainError,
};
use crate::config::ChainEndpointConfig;
use crate::storage::{BridgeStatus, LedgerClient, StatusUpdate};
use crate::types::{Message, MessageState};

const GET_PENDING_COUNT_SIG: &str = "getPendingCount()";
const PENDING_MESSAGES_SIG: &str = "pendingMessages(uint256)";
const GET_MESSAGE_SIG: &str = "getMessage(bytes32)";
const GET_TIME_REMAINING_SIG: &str = "getTimeRemaining(bytes32)";
const FINALIZE_SIG: &str = "finalize(bytes32)";
const EXECUTE_MINT_SIG: &str = "executeMint(bytes32)";

/// Zero word, the ABI encoding of "no challenger".
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Settles pending messages on one destination chain.
pub struct Finalizer {
    /// Chain name for log lines
    chain: String,
    /// Destination chain client
    client: Arc<ChainClient>,
    /// Message inbox address
    inbox_addr: String,
    /// Settlement contract address
    settlement_addr: String,
    /// Durable transfer ledger, when configured
    ledger: Option<Arc<LedgerClient>>,
    /// Finalizer counters
    status: Arc<FinalizerStatus>,
}

impl Finalizer {
    /// Creates a new finalizer for one destination chain.
    pub fn new(
        client: Arc<ChainClient>,
        chain: &ChainEndpointConfig,
        ledger: Option<Arc<LedgerClient>>,
        status: Arc<FinalizerStatus>,
    ) -> Self {
        Self {
            chain: chain.name.clone(),
            client,
            inbox_addr: chain.inbox_addr.clone(),
            settlement_addr: chain.settlement_addr.clone(),
            ledger,
            status,
        }
    }

    /// One finalizer tick over the inbox's pending set.
    pub async fn poll_once(&self) -> Result<()> {
        let count = self
            .pending_count()
            .await
            .with_context(|| format!("[{}] Failed to read pending count", self.chain))?;

        if count == 0 {
            debug!("[{}] No pending messages", self.chain);
            return Ok(());
        }
        debug!("[{}] Inspecting {} pending messages", self.chain, count);

        for index in 0..count {
            // Errors are scoped per message: one bad entry must not stall
            // the rest of the set.
            let message_hash = match self.pending_message_at(index).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(
                        "[{}] Failed to read pending message {}: {}",
                        self.chain, index, e
                    );
                    continue;
                }
            };

            if let Err(e) = self.process_message(&message_hash).await {
                error!(
                    "[{}] Failed to process message {}: {}; will retry next tick",
                    self.chain, message_hash, e
                );
            }
        }

        Ok(())
    }

    /// Inspects one message and settles it when its time has come.
    async fn process_message(&self, message_hash: &str) -> Result<(), ChainError> {
        let message = self.get_message(message_hash).await?;

        match message.state {
            MessageState::Challenged | MessageState::Rejected => {
                // Disputed externally; resolution is not the relay's call.
                debug!(
                    "[{}] Message {} is {:?}, leaving untouched",
                    self.chain, message.message_hash, message.state
                );
                Ok(())
            }
            MessageState::Finalized => {
                // A previous tick (or process) finalized but did not mint.
                self.execute_mint(&message).await
            }
            MessageState::Pending => {
                let remaining = self.time_remaining(message_hash).await?;
                if remaining > 0 {
                    info!(
                        "[{}] Message {} has {}s of challenge period remaining",
                        self.chain, message.message_hash, remaining
                    );
                    return Ok(());
                }
                self.finalize_and_mint(&message).await
            }
        }
    }

    /// The two-step settlement sequence.
    async fn finalize_and_mint(&self, message: &Message) -> Result<(), ChainError> {
        let hash_word = word_from_hash(&message.message_hash)?;

        match self
            .client
            .send_function(&self.inbox_addr, FINALIZE_SIG, &[AbiToken::FixedBytes(hash_word)])
            .await
        {
            Ok(receipt) => {
                self.status.record_finalized();
                info!(
                    "[{}] Finalized message {} (tx {})",
                    self.chain, message.message_hash, receipt.transaction_hash
                );
            }
            Err(ChainError::Duplicate(reason)) => {
                debug!(
                    "[{}] Message {} already finalized ({})",
                    self.chain, message.message_hash, reason
                );
            }
            Err(e) => return Err(e),
        }

        self.execute_mint(message).await
    }

    /// Releases funds to the recipient. Idempotent through the on-chain
    /// guard: a duplicate revert means the mint already happened.
    async fn execute_mint(&self, message: &Message) -> Result<(), ChainError> {
        let hash_word = word_from_hash(&message.message_hash)?;

        match self
            .client
            .send_function(
                &self.settlement_addr,
                EXECUTE_MINT_SIG,
                &[AbiToken::FixedBytes(hash_word)],
            )
            .await
        {
            Ok(receipt) => {
                self.status.record_minted();
                info!(
                    "[{}] Executed mint for message {} (tx {})",
                    self.chain, message.message_hash, receipt.transaction_hash
                );
                self.mark_completed(message, "finalized and minted").await;
                Ok(())
            }
            Err(ChainError::Duplicate(reason)) => {
                debug!(
                    "[{}] Mint already executed for message {} ({})",
                    self.chain, message.message_hash, reason
                );
                self.mark_completed(message, "mint already executed on chain")
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Moves the transfer record to COMPLETED once funds are released.
    async fn mark_completed(&self, message: &Message, note: &str) {
        let Some(ref ledger) = self.ledger else {
            return;
        };
        let update = StatusUpdate::new(
            vec![BridgeStatus::Pending, BridgeStatus::Submitted],
            BridgeStatus::Completed,
        )
        .with_note(note);
        if let Err(e) = ledger
            .update_by_intent_hash(&message.intent_hash, &update)
            .await
        {
            warn!(
                "[{}] Failed to mark intent {} COMPLETED in ledger: {:#}",
                self.chain, message.intent_hash, e
            );
        }
    }

    // ------------------------------------------------------------------
    // Inbox views
    // ------------------------------------------------------------------

    async fn pending_count(&self) -> Result<u64, ChainError> {
        let data = self
            .client
            .call_function(&self.inbox_addr, GET_PENDING_COUNT_SIG, &[])
            .await?;
        let words = decode_words(&data)?;
        words
            .first()
            .map(u64_from_word)
            .transpose()?
            .ok_or_else(|| ChainError::Transport("empty getPendingCount result".to_string()))
    }

    async fn pending_message_at(&self, index: u64) -> Result<String, ChainError> {
        let data = self
            .client
            .call_function(
                &self.inbox_addr,
                PENDING_MESSAGES_SIG,
                &[AbiToken::Uint(index as u128)],
            )
            .await?;
        let words = decode_words(&data)?;
        words
            .first()
            .map(hash_from_word)
            .ok_or_else(|| ChainError::Transport("empty pendingMessages result".to_string()))
    }

    async fn time_remaining(&self, message_hash: &str) -> Result<u64, ChainError> {
        let data = self
            .client
            .call_function(
                &self.inbox_addr,
                GET_TIME_REMAINING_SIG,
                &[AbiToken::FixedBytes(word_from_hash(message_hash)?)],
            )
            .await?;
        let words = decode_words(&data)?;
        words
            .first()
            .map(u64_from_word)
            .transpose()?
            .ok_or_else(|| ChainError::Transport("empty getTimeRemaining result".to_string()))
    }

    /// Reads and decodes one message record from the inbox.
    ///
    /// Word layout: intent hash, state discriminant, submittedAt,
    /// challengePeriodEnd, challenger (zero address when unchallenged).
    async fn get_message(&self, message_hash: &str) -> Result<Message, ChainError> {
        let data = self
            .client
            .call_function(
                &self.inbox_addr,
                GET_MESSAGE_SIG,
                &[AbiToken::FixedBytes(word_from_hash(message_hash)?)],
            )
            .await?;
        let words = decode_words(&data)?;
        if words.len() < 5 {
            return Err(ChainError::Transport(format!(
                "getMessage returned {} words, expected 5",
                words.len()
            )));
        }

        let state_raw = u64_from_word(&words[1])?;
        let state = MessageState::from_u8(state_raw as u8)
            .map_err(|e| ChainError::Transport(format!("{:#}", e)))?;
        let challenger = match address_from_word(&words[4]) {
            addr if addr == ZERO_ADDRESS => None,
            addr => Some(addr),
        };

        Ok(Message {
            message_hash: message_hash.to_string(),
            intent_hash: hash_from_word(&words[0]),
            state,
            submitted_at: u64_from_word(&words[2])?,
            challenge_period_end: u64_from_word(&words[3])?,
            challenger,
        })
    }
}
