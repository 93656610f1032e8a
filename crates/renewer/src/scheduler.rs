//! Background certificate renewal scheduler
//!
//! Runs one cycle immediately, then one per check interval until cancelled.
//! Cycles never overlap: the next tick is only awaited once the current
//! cycle has returned, and ticks missed meanwhile are not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::notify::{error_chain, failure_body, Notifier, FAILURE_SUBJECT};
use crate::orchestrator::{CycleOutcome, RenewalOrchestrator};

/// Background certificate renewal scheduler
pub struct RenewalScheduler {
    /// Runs the actual cycles
    orchestrator: Arc<RenewalOrchestrator>,
    /// Receives failed-cycle reports
    notifier: Arc<dyn Notifier>,
    /// Time between cycle starts
    check_interval: Duration,
}

impl RenewalScheduler {
    pub fn new(
        orchestrator: Arc<RenewalOrchestrator>,
        notifier: Arc<dyn Notifier>,
        check_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            notifier,
            check_interval,
        }
    }

    /// Run the scheduling loop until `shutdown` is cancelled.
    ///
    /// A cycle in progress when cancellation arrives is allowed to finish;
    /// no further cycle is started afterwards.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "Starting certificate renewal scheduler"
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Renewal scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Running scheduled certificate renewal check");
                    self.run_once().await;
                }
            }
        }
    }

    /// Run a single cycle and report its outcome
    pub async fn run_once(&self) {
        let start = Instant::now();

        match self.orchestrator.run_cycle().await {
            Ok(CycleOutcome::Skipped) => {
                debug!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Renewal cycle finished, nothing to do"
                );
            }
            Ok(CycleOutcome::Renewed) => {
                info!(
                    domains = %self.orchestrator.target().domains,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Renewal cycle finished, certificate renewed"
                );
            }
            Err(e) => {
                error!(
                    error = %error_chain(&e),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Renewal cycle failed"
                );

                let body = failure_body(&self.orchestrator.target().domains, &e);
                if let Err(notify_err) = self.notifier.notify(FAILURE_SUBJECT, &body).await {
                    warn!(error = %notify_err, "Failed to send failure notification");
                }
            }
        }
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("orchestrator", &self.orchestrator)
            .field("check_interval", &self.check_interval)
            .finish()
    }
}
