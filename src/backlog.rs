//! Backlog Reconciliation Module
//!
//! Recovery path for transfers that fell through the live pipeline: a crash
//! between broadcast and bookkeeping, a submission that exhausted its
//! transient retries, a ledger outage. The reconciler scans the durable
//! ledger for Bridge records stuck in PENDING, rebuilds each intent from the
//! record, and pushes it through the same submitter path the watcher uses.
//!
//! Safe to run alongside live relaying: both paths share the dedup set, the
//! ledger updates are compare-and-set, and the inbox rejects duplicates
//! harmlessly. Runs on a schedule when configured, or on demand via the
//! `reconcile_backlog` binary.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::storage::{BridgeStatus, LedgerClient, StatusUpdate, TransferRecord};
use crate::submitter::{SubmitOutcome, Submitter};

/// Outcome totals of one reconciliation pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BacklogSummary {
    /// PENDING records inspected
    pub scanned: u64,
    /// Records resubmitted to a destination inbox
    pub resubmitted: u64,
    /// Records whose transfer had already succeeded; reclassified COMPLETED
    pub completed: u64,
    /// Records that failed permanently; reclassified FAILED
    pub failed: u64,
    /// Records left PENDING for a later pass (transient errors, missing data)
    pub deferred: u64,
}

impl BacklogSummary {
    /// Records this pass changed to a terminal or submitted state.
    pub fn repaired(&self) -> u64 {
        self.resubmitted + self.completed + self.failed
    }
}

/// Scans the durable ledger and repairs stuck transfers.
pub struct BacklogReconciler {
    /// Durable transfer ledger
    ledger: Arc<LedgerClient>,
    /// Submitter per destination chain ID
    routes: HashMap<u64, Arc<Submitter>>,
    /// Pause between records
    rate_limit: Duration,
}

impl BacklogReconciler {
    /// Creates a new reconciler.
    ///
    /// `routes` maps each destination chain ID to the submitter of the
    /// direction that settles there.
    pub fn new(
        ledger: Arc<LedgerClient>,
        routes: HashMap<u64, Arc<Submitter>>,
        rate_limit: Duration,
    ) -> Self {
        Self {
            ledger,
            routes,
            rate_limit,
        }
    }

    /// One full reconciliation pass over the ledger.
    pub async fn run_once(&self) -> Result<BacklogSummary> {
        let records = self.ledger.pending_bridge_records().await?;
        info!("Backlog scan found {} pending bridge records", records.len());

        let mut summary = BacklogSummary::default();
        let total = records.len();

        for (position, record) in records.into_iter().enumerate() {
            summary.scanned += 1;
            self.reconcile_record(&record, &mut summary).await;

            // Rate-limit between records so a large backlog does not
            // overload the destination chain.
            if position + 1 < total {
                tokio::time::sleep(self.rate_limit).await;
            }
        }

        info!(
            "Backlog pass done: {} scanned, {} resubmitted, {} completed, {} failed, {} deferred",
            summary.scanned, summary.resubmitted, summary.completed, summary.failed,
            summary.deferred
        );
        Ok(summary)
    }

    /// Repairs one record, updating the pass summary.
    async fn reconcile_record(&self, record: &TransferRecord, summary: &mut BacklogSummary) {
        if record.intent_hash.is_empty() {
            // Deposit observed but the intent was never committed; nothing
            // to relay yet.
            debug!("Record {} has no intent hash yet, skipping", record.id);
            summary.deferred += 1;
            return;
        }

        let intent = match record.to_intent() {
            Ok(intent) => intent,
            Err(e) => {
                warn!("Record {} cannot be rebuilt: {:#}", record.id, e);
                self.note_error(record, &format!("backlog: {:#}", e)).await;
                summary.deferred += 1;
                return;
            }
        };

        let Some(submitter) = self.routes.get(&intent.dst_chain_id) else {
            warn!(
                "Record {} targets unknown destination chain {}",
                record.id, intent.dst_chain_id
            );
            self.note_error(
                record,
                &format!(
                    "backlog: no relay direction for destination chain {}",
                    intent.dst_chain_id
                ),
            )
            .await;
            summary.deferred += 1;
            return;
        };

        match submitter.submit(&intent).await {
            Ok(SubmitOutcome::Submitted { tx_hash }) => {
                // The submitter already moved the record to SUBMITTED.
                info!(
                    "Backlog resubmitted intent {} (record {}, tx {})",
                    intent.intent_hash, record.id, tx_hash
                );
                summary.resubmitted += 1;
            }
            Ok(SubmitOutcome::AlreadyProcessed) => {
                // The transfer actually succeeded earlier; only the ledger
                // was stale.
                let update = StatusUpdate::new(
                    vec![BridgeStatus::Pending, BridgeStatus::Submitted],
                    BridgeStatus::Completed,
                )
                .with_note("backlog: transfer already relayed, ledger record was stale");
                match self.ledger.update_status(&record.id, &update).await {
                    Ok(_) => {
                        info!(
                            "Backlog reclassified record {} (intent {}) as COMPLETED",
                            record.id, intent.intent_hash
                        );
                        summary.completed += 1;
                    }
                    Err(e) => {
                        warn!("Failed to reclassify record {}: {:#}", record.id, e);
                        summary.deferred += 1;
                    }
                }
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Backlog submission for record {} failed transiently: {}; leaving PENDING",
                    record.id, e
                );
                self.note_error(record, &format!("backlog: {}", e)).await;
                summary.deferred += 1;
            }
            Err(e) => {
                // The submitter already moved the record to FAILED.
                warn!(
                    "Backlog submission for record {} failed permanently: {}",
                    record.id, e
                );
                summary.failed += 1;
            }
        }
    }

    /// Records an error on a PENDING record without changing its status.
    async fn note_error(&self, record: &TransferRecord, note: &str) {
        let update =
            StatusUpdate::new(vec![BridgeStatus::Pending], BridgeStatus::Pending).with_note(note);
        if let Err(e) = self.ledger.update_status(&record.id, &update).await {
            warn!("Failed to record note on record {}: {:#}", record.id, e);
        }
    }
}
