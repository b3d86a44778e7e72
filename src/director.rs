//! Relay Director Module
//!
//! Wires the whole relay from configuration: one chain client per chain, the
//! attestation signer, the durable ledger, a Watcher+Submitter pipeline per
//! direction, a Finalizer per chain, the backlog reconciler, and the
//! operational API. Owns the shutdown signal: on interrupt every loop stops
//! accepting new ticks and the in-flight tick finishes before the process
//! exits.
//!
//! The two directions share no mutable state beyond the durable ledger
//! (compare-and-set protected) and the status counters; each pipeline owns
//! its own processed set and chain connections.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{ApiServer, StatusRegistry};
use crate::backlog::BacklogReconciler;
use crate::chain_client::ChainClient;
use crate::config::{ChainEndpointConfig, Config, DirectionConfig};
use crate::crypto::CryptoService;
use crate::finalizer::Finalizer;
use crate::scheduler::{self, Shutdown};
use crate::storage::{LedgerClient, ProcessedSet};
use crate::submitter::Submitter;
use crate::watcher::Watcher;

/// Builds and runs the relay's component graph.
pub struct RelayDirector {
    config: Config,
    status: Arc<StatusRegistry>,
    watchers: Vec<(String, Arc<Watcher>)>,
    finalizers: Vec<(String, Arc<Finalizer>)>,
    backlog: Option<Arc<BacklogReconciler>>,
}

impl RelayDirector {
    /// Constructs every component from configuration.
    ///
    /// Fails fast: a bad signing key, unparseable address, or unreachable
    /// config detail surfaces here, before any loop starts.
    pub fn new(config: Config) -> Result<Self> {
        let signer = Arc::new(CryptoService::new(&config)?);
        let send_timeout = Duration::from_secs(config.relayer.send_timeout_secs);

        let client_a = Arc::new(ChainClient::new(
            &config.chain_a.name,
            &config.chain_a.rpc_url,
            &config.chain_a.operator_addr,
            send_timeout,
        )?);
        let client_b = Arc::new(ChainClient::new(
            &config.chain_b.name,
            &config.chain_b.rpc_url,
            &config.chain_b.operator_addr,
            send_timeout,
        )?);

        let ledger = match &config.ledger {
            Some(cfg) => Some(Arc::new(LedgerClient::new(&cfg.base_url)?)),
            None => None,
        };
        let status = Arc::new(StatusRegistry::new());

        let (watcher_ab, submitter_ab) = build_pipeline(
            "a_to_b",
            &config.a_to_b,
            &config.chain_a,
            &config.chain_b,
            client_a.clone(),
            client_b.clone(),
            &signer,
            &ledger,
            &status,
        );
        let (watcher_ba, submitter_ba) = build_pipeline(
            "b_to_a",
            &config.b_to_a,
            &config.chain_b,
            &config.chain_a,
            client_b.clone(),
            client_a.clone(),
            &signer,
            &ledger,
            &status,
        );

        let finalizer_a = Arc::new(Finalizer::new(
            client_a.clone(),
            &config.chain_a,
            ledger.clone(),
            status.register_finalizer(&config.chain_a.name),
        ));
        let finalizer_b = Arc::new(Finalizer::new(
            client_b.clone(),
            &config.chain_b,
            ledger.clone(),
            status.register_finalizer(&config.chain_b.name),
        ));

        let backlog = match (&ledger, &config.ledger) {
            (Some(ledger), Some(ledger_cfg)) => {
                let mut routes = HashMap::new();
                routes.insert(config.chain_b.chain_id, submitter_ab);
                routes.insert(config.chain_a.chain_id, submitter_ba);
                Some(Arc::new(BacklogReconciler::new(
                    ledger.clone(),
                    routes,
                    Duration::from_millis(ledger_cfg.backlog_rate_limit_ms),
                )))
            }
            _ => None,
        };

        let finalizers = vec![
            (format!("finalizer-{}", config_name(&config.chain_a)), finalizer_a),
            (format!("finalizer-{}", config_name(&config.chain_b)), finalizer_b),
        ];

        Ok(Self {
            config,
            status,
            watchers: vec![
                ("watcher-a-to-b".to_string(), watcher_ab),
                ("watcher-b-to-a".to_string(), watcher_ba),
            ],
            finalizers,
            backlog,
        })
    }

    /// The backlog reconciler, when the ledger is configured. Used by the
    /// on-demand recovery binary.
    pub fn backlog(&self) -> Option<Arc<BacklogReconciler>> {
        self.backlog.clone()
    }

    /// Runs the relay until an interrupt signal arrives, then shuts down
    /// gracefully.
    pub async fn run(self) -> Result<()> {
        let (handle, shutdown) = scheduler::shutdown_channel();
        let tasks = self.spawn_tasks(&shutdown);

        info!("Relay director running with {} tasks", tasks.len());
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for interrupt signal")?;

        info!("Interrupt received, shutting down");
        handle.shutdown();
        futures::future::join_all(tasks).await;
        info!("Relay director stopped");
        Ok(())
    }

    /// Spawns every loop against the given shutdown signal.
    fn spawn_tasks(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        for (name, watcher) in &self.watchers {
            let interval = Duration::from_millis(watcher.poll_interval_ms());
            let watcher = watcher.clone();
            tasks.push(tokio::spawn(scheduler::run_periodic(
                name.clone(),
                interval,
                shutdown.clone(),
                move || {
                    let watcher = watcher.clone();
                    async move { watcher.poll_once().await }
                },
            )));
        }

        let finalize_interval = Duration::from_millis(self.config.relayer.finalize_interval_ms);
        for (name, finalizer) in &self.finalizers {
            let finalizer = finalizer.clone();
            tasks.push(tokio::spawn(scheduler::run_periodic(
                name.clone(),
                finalize_interval,
                shutdown.clone(),
                move || {
                    let finalizer = finalizer.clone();
                    async move { finalizer.poll_once().await }
                },
            )));
        }

        if let (Some(backlog), Some(interval_ms)) = (
            &self.backlog,
            self.config.ledger.as_ref().and_then(|l| l.backlog_interval_ms),
        ) {
            let backlog = backlog.clone();
            let status = self.status.clone();
            tasks.push(tokio::spawn(scheduler::run_periodic(
                "backlog-reconciler",
                Duration::from_millis(interval_ms),
                shutdown.clone(),
                move || {
                    let backlog = backlog.clone();
                    let status = status.clone();
                    async move {
                        let summary = backlog.run_once().await?;
                        status.record_backlog_run(summary.repaired());
                        Ok(())
                    }
                },
            )));
        }

        let api = ApiServer::new(self.config.api.clone(), self.status.clone());
        let api_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api.run(api_shutdown).await {
                error!("API server error: {:#}", e);
            }
        }));

        tasks
    }
}

/// Builds one direction's Watcher+Submitter pipeline. Both directions go
/// through here, so the forward and reverse relays cannot drift apart.
#[allow(clippy::too_many_arguments)]
fn build_pipeline(
    direction: &str,
    dir_cfg: &DirectionConfig,
    source_chain: &ChainEndpointConfig,
    dest_chain: &ChainEndpointConfig,
    source_client: Arc<ChainClient>,
    dest_client: Arc<ChainClient>,
    signer: &Arc<CryptoService>,
    ledger: &Option<Arc<LedgerClient>>,
    status: &Arc<StatusRegistry>,
) -> (Arc<Watcher>, Arc<Submitter>) {
    let direction_status = status.register_direction(direction);
    let processed = Arc::new(ProcessedSet::new(ledger.clone()));

    let submitter = Arc::new(Submitter::new(
        direction,
        dest_client,
        signer.clone(),
        processed.clone(),
        ledger.clone(),
        &dest_chain.inbox_addr,
        direction_status.clone(),
    ));

    let watcher = Arc::new(Watcher::new(
        direction,
        dir_cfg.clone(),
        source_client,
        source_chain,
        dest_chain.chain_id,
        submitter.clone(),
        processed,
        direction_status,
    ));

    (watcher, submitter)
}

/// Lowercased chain name for task labels.
fn config_name(chain: &ChainEndpointConfig) -> String {
    chain.name.to_lowercase().replace(' ', "-")
}
