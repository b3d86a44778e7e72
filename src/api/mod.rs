//! Operational API Module
//!
//! Minimal HTTP surface for probes and operators: `/health` for liveness and
//! `/status` for a snapshot of what the relay loops have done: per-direction
//! watermarks and counters, per-chain finalization totals, backlog totals.
//! The loops write lock-free atomic counters; the API only ever reads.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;
use warp::Filter;

use crate::config::ApiConfig;
use crate::scheduler::Shutdown;

// ============================================================================
// STATUS REGISTRY
// ============================================================================

/// Counters for one relay direction's watcher/submitter pipeline.
pub struct DirectionStatus {
    /// Direction label, e.g. "a_to_b"
    label: String,
    /// Last fully processed source block (0 until the first advance)
    watermark: AtomicU64,
    /// Intent events observed on the source chain
    observed: AtomicU64,
    /// Intents submitted to the destination inbox by this process
    submitted: AtomicU64,
    /// Submissions resolved as already-present duplicates
    duplicates: AtomicU64,
    /// Intents permanently failed and skipped
    failed: AtomicU64,
}

impl DirectionStatus {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            watermark: AtomicU64::new(0),
            observed: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn set_watermark(&self, block: u64) {
        self.watermark.store(block, Ordering::Relaxed);
    }

    pub fn record_observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "direction": self.label,
            "watermark": self.watermark.load(Ordering::Relaxed),
            "observed": self.observed.load(Ordering::Relaxed),
            "submitted": self.submitted.load(Ordering::Relaxed),
            "duplicates": self.duplicates.load(Ordering::Relaxed),
            "failed": self.failed.load(Ordering::Relaxed),
        })
    }
}

/// Counters for one destination chain's finalizer.
pub struct FinalizerStatus {
    /// Chain name
    chain: String,
    /// Messages finalized by this process
    finalized: AtomicU64,
    /// Mints executed by this process
    minted: AtomicU64,
}

impl FinalizerStatus {
    fn new(chain: &str) -> Self {
        Self {
            chain: chain.to_string(),
            finalized: AtomicU64::new(0),
            minted: AtomicU64::new(0),
        }
    }

    pub fn record_finalized(&self) {
        self.finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_minted(&self) {
        self.minted.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "chain": self.chain,
            "finalized": self.finalized.load(Ordering::Relaxed),
            "minted": self.minted.load(Ordering::Relaxed),
        })
    }
}

/// Registry of everything `/status` reports.
///
/// Components register at director build time; the loops then update their
/// own handles without touching the registry again.
pub struct StatusRegistry {
    started_at: i64,
    directions: Mutex<Vec<Arc<DirectionStatus>>>,
    finalizers: Mutex<Vec<Arc<FinalizerStatus>>>,
    backlog_runs: AtomicU64,
    backlog_repaired: AtomicU64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now().timestamp(),
            directions: Mutex::new(Vec::new()),
            finalizers: Mutex::new(Vec::new()),
            backlog_runs: AtomicU64::new(0),
            backlog_repaired: AtomicU64::new(0),
        }
    }

    /// Registers a direction pipeline and returns its counter handle.
    pub fn register_direction(&self, label: &str) -> Arc<DirectionStatus> {
        let status = Arc::new(DirectionStatus::new(label));
        self.directions.lock().unwrap().push(status.clone());
        status
    }

    /// Registers a finalizer and returns its counter handle.
    pub fn register_finalizer(&self, chain: &str) -> Arc<FinalizerStatus> {
        let status = Arc::new(FinalizerStatus::new(chain));
        self.finalizers.lock().unwrap().push(status.clone());
        status
    }

    pub fn record_backlog_run(&self, repaired: u64) {
        self.backlog_runs.fetch_add(1, Ordering::Relaxed);
        self.backlog_repaired.fetch_add(repaired, Ordering::Relaxed);
    }

    /// Snapshot of all counters for the `/status` endpoint.
    pub fn snapshot(&self) -> serde_json::Value {
        let directions: Vec<_> = self
            .directions
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.snapshot())
            .collect();
        let finalizers: Vec<_> = self
            .finalizers
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.snapshot())
            .collect();

        serde_json::json!({
            "uptime_secs": chrono::Utc::now().timestamp() - self.started_at,
            "directions": directions,
            "finalizers": finalizers,
            "backlog": {
                "runs": self.backlog_runs.load(Ordering::Relaxed),
                "repaired": self.backlog_repaired.load(Ordering::Relaxed),
            },
        })
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// API SERVER
// ============================================================================

/// The relay's operational HTTP server.
pub struct ApiServer {
    config: ApiConfig,
    status: Arc<StatusRegistry>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, status: Arc<StatusRegistry>) -> Self {
        Self { config, status }
    }

    /// Serves `/health` and `/status` until shutdown is signalled.
    pub async fn run(self, mut shutdown: Shutdown) -> Result<()> {
        let status = self.status.clone();

        let health = warp::path("health")
            .and(warp::get())
            .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));
        let status_route = warp::path("status")
            .and(warp::get())
            .map(move || warp::reply::json(&status.snapshot()));
        let routes = health.or(status_route);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid API bind address {}:{}",
                    self.config.host, self.config.port
                )
            })?;

        let (bound, server) = warp::serve(routes)
            .bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await });
        info!("API server listening on {}", bound);
        server.await;
        info!("API server stopped");
        Ok(())
    }
}
