//! Dispatch and tracking ledger
//!
//! Obtains one tracking number per recipient from the carrier, hands the
//! complete set to the job in a single command, polls the carrier for status
//! events afterwards and exports the tracking report.

use chrono::Utc;
use futures::future::join_all;
use mailroom_core::models::{
    DispatchPlan, MailJob, Shipment, ShipmentUpdate, TrackingAssignment, TrackingReportRow,
    TRACKING_REPORT_COLUMNS,
};
use mailroom_core::{AppError, AppResult, CommandResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::carrier::{is_valid_tracking_number, CarrierProvider, DispatchRequest};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Events gathered by one polling round.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub updates: Vec<ShipmentUpdate>,
    /// Shipments the carrier could not report on this round.
    pub failed: usize,
}

pub struct DispatchLedger {
    carrier: Arc<dyn CarrierProvider>,
    max_attempts: u32,
}

impl DispatchLedger {
    pub fn new(carrier: Arc<dyn CarrierProvider>) -> Self {
        Self {
            carrier,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn carrier_name(&self) -> &str {
        self.carrier.name()
    }

    /// Dispatch every recipient of `job` with `plan`.
    ///
    /// Tracking numbers are collected first and recorded on the job in one
    /// command, so a carrier failure part way through leaves the job Approved
    /// with no recipient dispatched.
    #[tracing::instrument(skip_all, fields(job_id = %job.id(), carrier = %plan.carrier))]
    pub async fn dispatch(&self, job: &mut MailJob, plan: DispatchPlan) -> CommandResult {
        let now = Utc::now();
        job.guard_dispatch(&plan, now)?;
        let start = Instant::now();

        let mut issued = HashSet::with_capacity(job.recipients().len());
        let mut assignments = Vec::with_capacity(job.recipients().len());
        for recipient in job.recipients() {
            let request = DispatchRequest {
                job_id: job.id(),
                recipient_id: recipient.id,
                reference: recipient.reference.clone(),
                name: recipient.name.clone(),
                address: recipient.address.clone(),
                delivery_type: recipient.delivery_type,
                carrier: plan.carrier,
            };
            let tracking_number = self.create_shipment(job, &request, &issued).await?;
            issued.insert(tracking_number.clone());
            assignments.push(TrackingAssignment {
                recipient_id: recipient.id,
                tracking_number,
            });
        }

        let events = job.record_dispatch(plan, assignments, now)?;
        tracing::info!(
            recipients = issued.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Job dispatched"
        );
        Ok(events)
    }

    /// Ask the carrier for a tracking number, retrying when the call fails or
    /// the number is malformed or already used.
    async fn create_shipment(
        &self,
        job: &MailJob,
        request: &DispatchRequest,
        issued: &HashSet<String>,
    ) -> AppResult<String> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.carrier.create_shipment(request).await {
                Ok(number) if !is_valid_tracking_number(request.carrier, &number) => {
                    last_error = format!("malformed tracking number {}", number);
                }
                Ok(number) if issued.contains(&number) || !job.is_tracking_number_available(&number) => {
                    last_error = format!("duplicate tracking number {}", number);
                }
                Ok(number) => return Ok(number),
                Err(e) => last_error = e.to_string(),
            }
            tracing::warn!(
                recipient = %request.reference,
                attempt,
                max_attempts = self.max_attempts,
                error = %last_error,
                "Shipment creation failed"
            );
        }
        Err(AppError::Provider(format!(
            "Carrier {} could not create a shipment for {}: {}",
            self.carrier.name(),
            request.reference,
            last_error
        )))
    }

    /// Poll the carrier for every shipment concurrently.
    ///
    /// A failed poll is logged and counted; the shipment is simply polled
    /// again next round. Returns `AppError::Cancelled` if `cancel` fires first.
    pub async fn refresh_status(
        &self,
        shipments: &[Shipment],
        cancel: &CancellationToken,
    ) -> AppResult<RefreshOutcome> {
        let polls = join_all(shipments.iter().map(|shipment| async move {
            (shipment, self.carrier.poll(shipment).await)
        }));

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled("tracking refresh".to_string()));
            }
            results = polls => results,
        };

        let mut outcome = RefreshOutcome::default();
        for (shipment, result) in results {
            match result {
                Ok(events) if events.is_empty() => {}
                Ok(events) => outcome.updates.push(ShipmentUpdate {
                    recipient_id: shipment.recipient_id,
                    events,
                }),
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        tracking_number = %shipment.tracking_number,
                        error = %e,
                        "Carrier poll failed"
                    );
                }
            }
        }
        tracing::debug!(
            shipments = shipments.len(),
            updated = outcome.updates.len(),
            failed = outcome.failed,
            "Tracking refreshed"
        );
        Ok(outcome)
    }

    /// Tracking report of `job` as CSV.
    pub fn export_tracking_report(&self, job: &MailJob) -> AppResult<String> {
        render_tracking_csv(&job.tracking_report())
    }
}

/// Render report rows as CSV with a header line. Missing values are empty
/// cells; delivery dates are RFC 3339.
pub fn render_tracking_csv(rows: &[TrackingReportRow]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |e: csv::Error| AppError::Internal(format!("CSV encoding failed: {}", e));

    writer.write_record(TRACKING_REPORT_COLUMNS).map_err(csv_error)?;
    for row in rows {
        writer
            .write_record([
                row.job_id.to_string(),
                row.job_name.clone(),
                row.recipient_name.clone(),
                row.address.clone(),
                row.tracking_number.clone().unwrap_or_default(),
                row.status.clone(),
                row.delivery_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV encoding failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {}", e)))
}
