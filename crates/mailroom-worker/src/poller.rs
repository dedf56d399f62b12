//! Carrier status poller
//!
//! Refreshes every dispatched job on a fixed interval until its cancellation
//! token fires. A round that is still running when the next tick is due
//! delays that tick instead of queueing a burst.

use std::sync::Arc;
use std::time::Duration;

use mailroom_core::Config;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::JobRegistry;

pub struct StatusPoller {
    registry: Arc<JobRegistry>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(registry: Arc<JobRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Poller at the configured interval, or `None` when polling is disabled.
    pub fn from_config(registry: Arc<JobRegistry>, config: &Config) -> Option<Self> {
        if config.carrier_poll_interval_secs == 0 {
            return None;
        }
        Some(Self::new(
            registry,
            Duration::from_secs(config.carrier_poll_interval_secs),
        ))
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Carrier status poller started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let summary = self.registry.refresh_all(&cancel).await;
                    if summary.jobs > 0 {
                        tracing::debug!(
                            jobs = summary.jobs,
                            status_changes = summary.status_changes,
                            failed_jobs = summary.failed_jobs,
                            "Carrier status refreshed"
                        );
                    }
                    if summary.failed_jobs > 0 {
                        tracing::warn!(failed_jobs = summary.failed_jobs, "Status refresh failed for some jobs");
                    }
                }
            }
        }

        tracing::info!("Carrier status poller stopped");
    }
}
