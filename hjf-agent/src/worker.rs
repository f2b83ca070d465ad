//! Background ingestion worker
//!
//! Runs ingestion followed by the retention sweep immediately, then on a
//! fixed interval, until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::services::ingestion::{IngestionError, IngestionOrchestrator};
use crate::services::retention::RetentionSweep;

/// Default pause between runs
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

pub struct BackgroundWorker {
    orchestrator: Arc<IngestionOrchestrator>,
    retention: Arc<RetentionSweep>,
    interval: Duration,
}

impl BackgroundWorker {
    pub fn new(
        orchestrator: Arc<IngestionOrchestrator>,
        retention: Arc<RetentionSweep>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            retention,
            interval,
        }
    }

    /// One ingestion run plus retention sweep
    pub async fn run_cycle(&self) {
        match self.orchestrator.run().await {
            Ok(summary) => info!(
                inserted = summary.inserted,
                duplicates = summary.duplicates,
                "Scheduled ingestion complete"
            ),
            Err(IngestionError::AlreadyRunning) => {
                warn!("Skipping scheduled ingestion, a run is already in progress")
            }
        }

        if let Err(e) = self.retention.sweep().await {
            error!(error = %e, "Retention sweep failed");
        }
    }

    /// Spawn the worker loop
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Background worker started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    // The first tick completes immediately
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = self.run_cycle() => {}
                        }
                    }
                }
            }

            info!("Background worker stopped");
        })
    }
}
