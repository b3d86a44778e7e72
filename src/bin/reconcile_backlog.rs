//! On-Demand Backlog Reconciliation
//!
//! Operational recovery tool: runs one reconciliation pass over the durable
//! ledger's stuck PENDING transfers and prints the summary. The relay daemon
//! does not need to be stopped; the pass is safe to run alongside it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin reconcile_backlog
//! ```

use anyhow::Result;
use tracing::info;

use trusted_relay::config::Config;
use trusted_relay::director::RelayDirector;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    let director = RelayDirector::new(config)?;

    let backlog = director.backlog().ok_or_else(|| {
        anyhow::anyhow!("No [ledger] section configured; backlog reconciliation needs the durable ledger")
    })?;

    info!("Running one backlog reconciliation pass");
    let summary = backlog.run_once().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
