//! Periodic Task Scheduler
//!
//! Structured replacement for ad hoc sleep loops: every relay loop (watcher,
//! finalizer, backlog) runs as a [`run_periodic`] task wired to a shared
//! shutdown signal. Cancellation is cooperative: the signal is observed
//! between ticks and during the inter-tick sleep, never mid-tick, so an
//! in-flight network call completes or fails naturally. Chain-side effects
//! of a broadcast transaction are not revocable, which is why a tick is
//! never hard-killed.
//!
//! Repeated tick failures back off exponentially with jitter so a dead RPC
//! endpoint is not hammered at the poll interval.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Longest delay the failure backoff will reach.
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Cap on the backoff exponent.
const MAX_BACKOFF_SHIFT: u32 = 5;

// ============================================================================
// SHUTDOWN SIGNAL
// ============================================================================

/// Sender half of the shutdown signal, held by the director.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Signals all tasks to stop after their in-flight tick.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half of the shutdown signal, cloned into every task.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Whether shutdown has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until shutdown is signalled.
    ///
    /// A dropped sender counts as shutdown so orphaned tasks never hang.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

/// Creates a linked shutdown handle/signal pair.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

// ============================================================================
// PERIODIC TASK RUNNER
// ============================================================================

/// Delay before the next tick: the base interval after a success, jittered
/// exponential backoff after consecutive failures.
fn backoff_delay(base: Duration, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return base;
    }
    let shift = consecutive_failures.min(MAX_BACKOFF_SHIFT);
    let scaled = base.saturating_mul(1u32 << shift).min(MAX_BACKOFF);
    // Up to 25% jitter so restarted relays don't retry in lockstep
    let jitter_ms = rand::thread_rng().gen_range(0..=scaled.as_millis() as u64 / 4);
    (scaled + Duration::from_millis(jitter_ms)).min(MAX_BACKOFF)
}

/// Runs a tick function on an interval until shutdown.
///
/// The tick runs to completion before the signal is honored; errors are
/// logged and counted, never propagated; a failing tick backs the task off
/// but never kills the process.
pub async fn run_periodic<F, Fut>(
    name: impl Into<String>,
    interval: Duration,
    mut shutdown: Shutdown,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let name = name.into();
    info!("Task '{}' started, interval {:?}", name, interval);
    let mut consecutive_failures = 0u32;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match tick().await {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "Task '{}' tick failed ({} consecutive): {:#}",
                    name, consecutive_failures, e
                );
            }
        }

        let delay = backoff_delay(interval, consecutive_failures);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Task '{}' stopped", name);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_delay_bounds() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), base);

        for _ in 0..20 {
            let delay = backoff_delay(base, 3);
            assert!(delay >= Duration::from_secs(8));
            assert!(delay <= Duration::from_secs(10));
        }

        // Deep failure counts are capped
        assert!(backoff_delay(Duration::from_secs(30), 20) <= MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task_after_inflight_tick() {
        let (handle, shutdown) = shutdown_channel();
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_in_task = ticks.clone();

        let task = tokio::spawn(run_periodic(
            "test",
            Duration::from_millis(10),
            shutdown,
            move || {
                let ticks = ticks_in_task.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();
        task.await.expect("task should stop cleanly");
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failing_tick_does_not_kill_task() {
        let (handle, shutdown) = shutdown_channel();
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_in_task = ticks.clone();

        let task = tokio::spawn(run_periodic(
            "failing",
            Duration::from_millis(5),
            shutdown,
            move || {
                let ticks = ticks_in_task.clone();
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("boom")
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.shutdown();
        task.await.expect("task should stop cleanly");
        assert!(ticks.load(Ordering::SeqCst) >= 2, "task should keep ticking through failures");
    }
}
