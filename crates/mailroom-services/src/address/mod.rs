//! Address validation
//!
//! [`AddressValidator`] runs a batch of address checks against an
//! [`AddressProvider`], one address at a time, reporting progress from 0 to
//! 100 on a watch channel. The run stops as soon as its cancellation token
//! fires and returns no verdicts at all in that case, so a cancelled run
//! never reaches the job.

pub mod rules;

use async_trait::async_trait;
use mailroom_core::models::{Verdict, VerdictRecord};
use mailroom_core::{AddressCheck, AppError, AppResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// External address-verification service.
#[async_trait]
pub trait AddressProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Verify one single-line mailing address.
    ///
    /// An `Err` means the provider could not answer; the validator turns it
    /// into an exception for that recipient only.
    async fn verify(&self, address: &str) -> anyhow::Result<Verdict>;
}

pub struct AddressValidator {
    provider: Arc<dyn AddressProvider>,
    /// Pause before each provider call; simulates service latency.
    step_delay: Duration,
}

impl AddressValidator {
    pub fn new(provider: Arc<dyn AddressProvider>) -> Self {
        Self {
            provider,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Validate every address in `checks`, in order.
    ///
    /// Progress only ever increases and ends at 100 on success. Returns
    /// `AppError::Cancelled` if `cancel` fires first.
    #[tracing::instrument(skip_all, fields(provider = %self.provider.name(), addresses = checks.len()))]
    pub async fn validate(
        &self,
        checks: Vec<AddressCheck>,
        progress: &watch::Sender<u8>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<VerdictRecord>> {
        let start = Instant::now();
        let total = checks.len();
        let mut records = Vec::with_capacity(total);
        let mut exceptions = 0usize;
        progress.send_replace(0);

        for (index, check) in checks.into_iter().enumerate() {
            let verdict = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(completed = index, total, "Address validation cancelled");
                    return Err(AppError::Cancelled("address validation".to_string()));
                }
                verdict = self.verify_one(&check) => verdict,
            };

            if let Verdict::Exception { reason, .. } = &verdict {
                exceptions += 1;
                tracing::debug!(
                    recipient_id = %check.recipient_id,
                    reason = %reason,
                    "Address exception"
                );
            }
            records.push(VerdictRecord {
                recipient_id: check.recipient_id,
                verdict,
            });
            report_progress(progress, ((index + 1) * 100 / total.max(1)) as u8);
        }

        // Covers an empty batch, which has no per-item step.
        report_progress(progress, 100);

        tracing::info!(
            total,
            exceptions,
            duration_ms = start.elapsed().as_millis() as u64,
            "Address validation completed"
        );
        Ok(records)
    }

    async fn verify_one(&self, check: &AddressCheck) -> Verdict {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        match self.provider.verify(&check.address).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(
                    recipient_id = %check.recipient_id,
                    error = %e,
                    "Address provider failed"
                );
                Verdict::exception(format!("address provider unavailable: {}", e), None)
            }
        }
    }
}

/// Publish `value` unless it would move progress backwards.
fn report_progress(progress: &watch::Sender<u8>, value: u8) {
    progress.send_if_modified(|current| {
        if value > *current {
            *current = value;
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct FlakyProvider;

    #[async_trait]
    impl AddressProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn verify(&self, address: &str) -> anyhow::Result<Verdict> {
            if address.contains("timeout") {
                anyhow::bail!("upstream timed out");
            }
            Ok(Verdict::Valid)
        }
    }

    fn checks(addresses: &[&str]) -> Vec<AddressCheck> {
        addresses
            .iter()
            .map(|a| AddressCheck {
                recipient_id: Uuid::new_v4(),
                address: a.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_provider_failure_is_per_recipient() {
        let validator = AddressValidator::new(Arc::new(FlakyProvider));
        let (tx, rx) = watch::channel(0u8);

        let records = validator
            .validate(
                checks(&["1 Main St", "timeout lane", "3 Main St"]),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].verdict, Verdict::Valid);
        assert!(matches!(
            &records[1].verdict,
            Verdict::Exception { reason, .. } if reason.contains("upstream timed out")
        ));
        assert_eq!(records[2].verdict, Verdict::Valid);
        assert_eq!(*rx.borrow(), 100);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let validator = AddressValidator::new(Arc::new(FlakyProvider))
            .with_step_delay(Duration::from_millis(1));
        let (tx, mut rx) = watch::channel(0u8);

        let watcher = tokio::spawn(async move {
            let mut seen = vec![*rx.borrow()];
            while rx.changed().await.is_ok() {
                seen.push(*rx.borrow_and_update());
            }
            seen
        });

        validator
            .validate(
                checks(&["1 A St", "2 B St", "3 C St", "4 D St"]),
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        drop(tx);

        let seen = watcher.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_nothing() {
        let validator = AddressValidator::new(Arc::new(FlakyProvider))
            .with_step_delay(Duration::from_secs(30));
        let (tx, rx) = watch::channel(0u8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = validator
            .validate(checks(&["1 Main St", "2 Main St"]), &tx, &cancel)
            .await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
        assert_eq!(*rx.borrow(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let validator = AddressValidator::new(Arc::new(FlakyProvider));
        let (tx, rx) = watch::channel(0u8);
        let records = validator
            .validate(Vec::new(), &tx, &CancellationToken::new())
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(*rx.borrow(), 100);
    }
}
