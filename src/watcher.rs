//! Source Chain Watcher Module
//!
//! One watcher runs per relay direction. Each tick it reads the source
//! chain's head, fetches `IntentCommitted` events above its watermark,
//! gates them on confirmation depth, and hands confirmed intents to the
//! submitter one at a time.
//!
//! Watermark rule: `last_processed_block` advances to the scanned head only
//! when every event in the range was submitted, deduplicated, or
//! deliberately skipped with a logged error. Anything still waiting, such
//! as unconfirmed events or transient submission failures, holds the watermark
//! so the next tick rescans the range. Rescans are cheap and safe: the
//! processed set and the pending-confirmation map make them idempotent.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::DirectionStatus;
use crate::chain_client::{
    address_from_word, decode_words, u128_from_word, u64_from_word, word_from_hash, ChainClient,
    LogEntry,
};
use crate::config::{ChainEndpointConfig, DirectionConfig};
use crate::storage::ProcessedSet;
use crate::submitter::{SubmitOutcome, Submitter};
use crate::types::{normalize_hex, Intent};

/// Event emitted by the intent store when a user commits an intent.
pub const INTENT_COMMITTED_SIG: &str =
    "IntentCommitted(bytes32,address,uint64,uint64,address,uint256,address,uint64,uint64)";

/// Sentinel for a watermark that has not been initialized yet.
const WATERMARK_UNSET: u64 = u64::MAX;

/// An observed intent still short of its required confirmation depth.
#[derive(Debug, Clone)]
struct PendingConfirmation {
    intent: Intent,
    event_block: u64,
    first_seen: u64,
}

// ============================================================================
// EVENT PARSING
// ============================================================================

/// Parses an `IntentCommitted` log into an [`Intent`].
///
/// Topic layout: `topics[1]` is the intent hash, `topics[2]` the user; the
/// remaining seven fields are data words in declaration order.
pub fn parse_intent_committed(log: &LogEntry) -> Result<Intent> {
    if log.topics.len() < 3 {
        return Err(anyhow::anyhow!(
            "IntentCommitted log has {} topics, expected 3",
            log.topics.len()
        ));
    }

    let intent_hash = normalize_hex(&log.topics[1]);
    let user_word = word_from_hash(&log.topics[2]).context("Invalid user topic")?;

    let words = decode_words(&log.data).context("Invalid event data")?;
    if words.len() != 7 {
        return Err(anyhow::anyhow!(
            "IntentCommitted data has {} words, expected 7",
            words.len()
        ));
    }

    Ok(Intent {
        user: address_from_word(&user_word),
        src_chain_id: u64_from_word(&words[0]).context("Invalid srcChainId")?,
        dst_chain_id: u64_from_word(&words[1]).context("Invalid dstChainId")?,
        token: address_from_word(&words[2]),
        amount: u128_from_word(&words[3]).context("Invalid amount")?,
        recipient: address_from_word(&words[4]),
        nonce: u64_from_word(&words[5]).context("Invalid nonce")?,
        expiry: u64_from_word(&words[6]).context("Invalid expiry")?,
        intent_hash,
    })
}

// ============================================================================
// WATCHER IMPLEMENTATION
// ============================================================================

/// Watches one source chain for committed intents and feeds the submitter.
pub struct Watcher {
    /// Direction label for log lines, e.g. "a_to_b"
    direction: String,
    /// Direction-specific tuning (confirmations, intervals)
    cfg: DirectionConfig,
    /// Source chain client
    source: Arc<ChainClient>,
    /// Intent store contract on the source chain
    intent_store_addr: String,
    /// Chain ID intents must originate from
    src_chain_id: u64,
    /// Chain ID intents must settle on
    dst_chain_id: u64,
    /// Submitter for this direction
    submitter: Arc<Submitter>,
    /// Dedup set shared with the submitter
    processed: Arc<ProcessedSet>,
    /// Last fully processed source block; WATERMARK_UNSET until first tick
    last_processed_block: AtomicU64,
    /// Intents observed but not yet at required depth
    pending: RwLock<HashMap<String, PendingConfirmation>>,
    /// Direction counters
    status: Arc<DirectionStatus>,
}

impl Watcher {
    /// Creates a new watcher for one direction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: &str,
        cfg: DirectionConfig,
        source: Arc<ChainClient>,
        source_chain: &ChainEndpointConfig,
        dst_chain_id: u64,
        submitter: Arc<Submitter>,
        processed: Arc<ProcessedSet>,
        status: Arc<DirectionStatus>,
    ) -> Self {
        Self {
            direction: direction.to_string(),
            cfg,
            source,
            intent_store_addr: source_chain.intent_store_addr.clone(),
            src_chain_id: source_chain.chain_id,
            dst_chain_id,
            submitter,
            processed,
            last_processed_block: AtomicU64::new(WATERMARK_UNSET),
            pending: RwLock::new(HashMap::new()),
            status,
        }
    }

    /// Polling interval for this direction.
    pub fn poll_interval_ms(&self) -> u64 {
        self.cfg.poll_interval_ms
    }

    /// Current watermark, for tests and the status API.
    pub fn watermark(&self) -> u64 {
        self.last_processed_block.load(Ordering::SeqCst)
    }

    /// One watcher tick: scan above the watermark, gate on confirmations,
    /// submit what is ready, advance the watermark only when the range is
    /// fully accounted for.
    pub async fn poll_once(&self) -> Result<()> {
        let head = self
            .source
            .get_block_number()
            .await
            .with_context(|| format!("[{}] Failed to read source head", self.direction))?;

        let mut last = self.last_processed_block.load(Ordering::SeqCst);
        if last == WATERMARK_UNSET {
            // First tick: start from the configured block, or skip history
            // and start at the current head. Anything older belongs to the
            // backlog reconciler, not the live watcher.
            last = match self.cfg.start_block {
                Some(block) => block.saturating_sub(1),
                None => head,
            };
            self.last_processed_block.store(last, Ordering::SeqCst);
            self.status.set_watermark(last);
            info!(
                "[{}] Watermark initialized at block {} (head {})",
                self.direction, last, head
            );
        }

        if head <= last {
            debug!(
                "[{}] No new blocks (head {}, watermark {})",
                self.direction, head, last
            );
            return Ok(());
        }

        let logs = self
            .source
            .get_logs(&self.intent_store_addr, INTENT_COMMITTED_SIG, last + 1, head)
            .await
            .with_context(|| {
                format!(
                    "[{}] Failed to fetch intent events in ({}, {}]",
                    self.direction, last, head
                )
            })?;

        let mut range_clean = true;

        for log in &logs {
            if !self.process_log(log, head).await {
                range_clean = false;
            }
        }

        if !self.retry_pending(head).await {
            range_clean = false;
        }

        if range_clean {
            self.last_processed_block.store(head, Ordering::SeqCst);
            self.status.set_watermark(head);
            debug!("[{}] Watermark advanced to {}", self.direction, head);
        } else {
            debug!(
                "[{}] Watermark held at {} pending unresolved events",
                self.direction, last
            );
        }

        Ok(())
    }

    /// Handles one event from the scanned range. Returns false when the
    /// event is still unresolved and must hold the watermark.
    async fn process_log(&self, log: &LogEntry, head: u64) -> bool {
        let intent = match parse_intent_committed(log) {
            Ok(intent) => intent,
            Err(e) => {
                // Deliberate skip: an event the relay cannot decode will
                // never become decodable on rescan.
                error!(
                    "[{}] Unparseable IntentCommitted event in tx {}: {:#}",
                    self.direction, log.transaction_hash, e
                );
                return true;
            }
        };

        if intent.src_chain_id != self.src_chain_id || intent.dst_chain_id != self.dst_chain_id {
            // The store carries both directions' intents; the mirror
            // watcher owns the other ones.
            debug!(
                "[{}] Ignoring intent {} for direction {}→{}",
                self.direction, intent.intent_hash, intent.src_chain_id, intent.dst_chain_id
            );
            return true;
        }

        if self.processed.contains(&intent.intent_hash).await {
            return true;
        }
        if self.pending.read().await.contains_key(&intent.intent_hash) {
            // Already tracked; the retry pass decides whether it resolves
            // this tick or keeps holding the watermark.
            return true;
        }

        self.status.record_observed();
        let depth = head.saturating_sub(log.block_number);
        if depth < self.cfg.required_confirmations {
            debug!(
                "[{}] Intent {} at depth {}/{} , waiting for confirmations",
                self.direction, intent.intent_hash, depth, self.cfg.required_confirmations
            );
            self.pending.write().await.insert(
                intent.intent_hash.clone(),
                PendingConfirmation {
                    intent,
                    event_block: log.block_number,
                    first_seen: chrono::Utc::now().timestamp() as u64,
                },
            );
            return false;
        }

        self.submit_confirmed(&intent).await
    }

    /// Re-evaluates intents waiting on confirmations. Returns false when
    /// any entry is still unresolved.
    async fn retry_pending(&self, head: u64) -> bool {
        let snapshot: Vec<(String, PendingConfirmation)> = {
            let pending = self.pending.read().await;
            pending.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        if snapshot.is_empty() {
            return true;
        }

        let now = chrono::Utc::now().timestamp() as u64;
        let mut all_resolved = true;
        let mut resolved: Vec<String> = Vec::new();

        for (hash, entry) in snapshot {
            let depth = head.saturating_sub(entry.event_block);
            if depth >= self.cfg.required_confirmations {
                if self.submit_confirmed(&entry.intent).await {
                    resolved.push(hash);
                } else {
                    all_resolved = false;
                }
            } else if now.saturating_sub(entry.first_seen) > self.cfg.confirmation_timeout_secs {
                warn!(
                    "[{}] Intent {} stuck at depth {}/{} for over {}s; deferring to next rescan",
                    self.direction,
                    hash,
                    depth,
                    self.cfg.required_confirmations,
                    self.cfg.confirmation_timeout_secs
                );
                // Dropped from the map, but the held watermark guarantees
                // the rescan re-observes the event.
                resolved.push(hash);
                all_resolved = false;
            } else {
                all_resolved = false;
            }
        }

        let mut pending = self.pending.write().await;
        for hash in resolved {
            pending.remove(&hash);
        }
        all_resolved
    }

    /// Pushes a confirmed intent through the submitter. Returns true when
    /// the intent is accounted for (submitted, duplicate, or permanently
    /// failed and skipped), false when it must be retried.
    async fn submit_confirmed(&self, intent: &Intent) -> bool {
        match self.submitter.submit(intent).await {
            Ok(SubmitOutcome::Submitted { tx_hash }) => {
                info!(
                    "[{}] Relayed intent {} (tx {})",
                    self.direction, intent.intent_hash, tx_hash
                );
                true
            }
            Ok(SubmitOutcome::AlreadyProcessed) => true,
            Err(e) if e.is_transient() => {
                warn!(
                    "[{}] Transient failure submitting intent {}: {}; will retry",
                    self.direction, intent.intent_hash, e
                );
                false
            }
            Err(e) => {
                // Permanent failure: the submitter already marked the
                // transfer FAILED. Skipping deliberately keeps the
                // watermark moving.
                error!(
                    "[{}] Permanently failed intent {}: {}; skipping",
                    self.direction, intent.intent_hash, e
                );
                true
            }
        }
    }
}
