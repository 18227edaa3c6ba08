// Scheduler module
//
// Drives passes on a fixed interval. Passes never overlap: the next tick is
// only awaited after the current pass has returned.

use crate::metrics::Metrics;
use crate::services::Pass;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Fixed-interval pass scheduler
///
/// A tick that falls due while a pass is running fires once as soon as that
/// pass ends; missed ticks are never replayed as a burst. Pass errors are
/// logged and the schedule carries on.
pub struct Scheduler {
    pass: Arc<dyn Pass>,
    interval: Duration,
    run_on_startup: bool,
    metrics: Option<Arc<Metrics>>,
}

impl Scheduler {
    /// # Arguments
    /// * `pass` - What every tick runs
    /// * `interval` - Period between ticks, measured from the first one
    /// * `run_on_startup` - Fire the first tick immediately instead of after one interval
    pub fn new(pass: Arc<dyn Pass>, interval: Duration, run_on_startup: bool) -> Self {
        Self {
            pass,
            interval,
            run_on_startup,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run passes until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// Shutdown is checked between passes; a running pass always finishes.
    ///
    /// # Returns
    /// How many passes were started
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let first_tick = if self.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Scheduler started: every {:?}, run on startup: {}",
            self.interval,
            self.run_on_startup
        );

        let mut passes = 0usize;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Shutdown channel closed");
                        break;
                    }
                    continue;
                }
            }

            passes += 1;
            tracing::info!("Executing pass {}", passes);

            match self.pass.run().await {
                Ok(report) => tracing::info!("Pass {} finished: {}", passes, report.summary()),
                Err(e) => tracing::error!("Pass {} aborted: {}", passes, e),
            }

            if let Some(metrics) = &self.metrics {
                metrics.log_periodic();
            }
        }

        tracing::info!("Scheduler stopped after {} passes", passes);
        passes
    }
}

/// Turn `shutdown` to `true` once `signal` resolves.
///
/// If listening for the signal fails the sender is held forever instead, so the
/// scheduler keeps its interval rather than stopping after the current pass.
pub async fn shutdown_on<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Ctrl-C received, stopping after the current pass");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
