//! Job registry
//!
//! Owns every live [`MailJob`] behind its own mutex, so commands on one job
//! are applied one at a time while different jobs proceed independently.
//! Long-running work (address validation, carrier polling) runs without the
//! job lock held and re-acquires it only to apply its results.

use std::collections::HashMap;
use std::sync::Arc;

use mailroom_core::models::{
    AddressException, DeliveryType, DispatchPlan, ImportRowError, JobDetails, JobEvent, JobStage,
    MailJob, NewRecipient,
};
use mailroom_core::{AppError, AppResult, CommandResult, DocumentRemoval, ErrorMetadata, LogLevel};
use mailroom_services::DocumentUpload;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::WorkerContext;

type JobHandle = Arc<Mutex<MailJob>>;

/// Result of importing recipients into a job.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub events: Vec<JobEvent>,
    /// Rows that failed to parse or that the job refused.
    pub rejected: Vec<ImportRowError>,
}

/// Totals of one refresh across all dispatched jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub jobs: usize,
    pub status_changes: usize,
    pub failed_jobs: usize,
}

/// A running address validation.
///
/// Progress goes from 0 to 100. Dropping the run does not stop it; call
/// [`ValidationRun::cancel`] for that.
pub struct ValidationRun {
    job_id: Uuid,
    progress: watch::Receiver<u8>,
    cancel: CancellationToken,
    handle: JoinHandle<CommandResult>,
}

impl ValidationRun {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish. A cancelled run returns the
    /// `ValidationCancelled` event and leaves every recipient `Pending`. A
    /// run that panicked is reported as `Internal`; the job is released
    /// either way.
    pub async fn wait(self) -> CommandResult {
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("Validation task failed: {}", e)))?
    }
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
    context: WorkerContext,
}

impl JobRegistry {
    pub fn new(context: WorkerContext) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            context,
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub async fn create_job(&self, details: JobDetails) -> AppResult<Uuid> {
        let job = MailJob::new(details)?;
        let job_id = job.id();
        tracing::info!(job_id = %job_id, name = %job.name(), "Mail job created");
        self.jobs
            .write()
            .await
            .insert(job_id, Arc::new(Mutex::new(job)));
        Ok(job_id)
    }

    pub async fn job_ids(&self) -> Vec<Uuid> {
        self.jobs.read().await.keys().copied().collect()
    }

    /// Copy of the job's current state.
    pub async fn snapshot(&self, job_id: Uuid) -> AppResult<MailJob> {
        let handle = self.handle(job_id).await?;
        let job = handle.lock().await;
        Ok(job.clone())
    }

    pub async fn exceptions(&self, job_id: Uuid) -> AppResult<Vec<AddressException>> {
        let handle = self.handle(job_id).await?;
        let job = handle.lock().await;
        Ok(job.exceptions())
    }

    async fn handle(&self, job_id: Uuid) -> AppResult<JobHandle> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("job", job_id))
    }

    /// Run a synchronous job command under the job's lock.
    pub async fn execute<F>(&self, job_id: Uuid, command: F) -> CommandResult
    where
        F: FnOnce(&mut MailJob) -> CommandResult,
    {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;
        record(job_id, command(&mut job))
    }

    pub async fn advance(&self, job_id: Uuid) -> CommandResult {
        self.execute(job_id, |job| job.advance()).await
    }

    pub async fn go_back(&self, job_id: Uuid) -> CommandResult {
        self.execute(job_id, |job| job.go_back()).await
    }

    /// Store uploads and attach them to the job. If the job refuses them,
    /// the stored content is deleted again.
    pub async fn upload_documents(&self, job_id: Uuid, uploads: Vec<DocumentUpload>) -> CommandResult {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;

        let result: CommandResult = async {
            job.ensure_editable()?;
            let documents = self.context.intake.ingest_all(job_id, uploads).await?;
            match job.add_documents(documents.clone()) {
                Ok(events) => Ok(events),
                Err(e) => {
                    for document in &documents {
                        self.context.intake.discard(document).await;
                    }
                    Err(e)
                }
            }
        }
        .await;
        record(job_id, result)
    }

    pub async fn remove_document(
        &self,
        job_id: Uuid,
        document_id: Uuid,
        policy: DocumentRemoval,
    ) -> CommandResult {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;

        let document = job.document(document_id).cloned();
        let result = job.remove_document(document_id, policy);
        if let (Ok(_), Some(document)) = (&result, document) {
            self.context.intake.discard(&document).await;
        }
        record(job_id, result)
    }

    pub async fn add_recipient(&self, job_id: Uuid, input: NewRecipient) -> CommandResult {
        self.execute(job_id, |job| job.add_recipient(input)).await
    }

    /// Add a directory contact as a recipient. Without `address_id` the
    /// organization's default address is used.
    pub async fn add_recipient_from_contact(
        &self,
        job_id: Uuid,
        contact_id: Uuid,
        address_id: Option<Uuid>,
        document_ids: Vec<Uuid>,
        delivery_type: DeliveryType,
    ) -> CommandResult {
        let input = self
            .context
            .directory
            .new_recipient_for(contact_id, address_id, document_ids, delivery_type)
            .await?;
        self.add_recipient(job_id, input).await
    }

    /// Import recipients from CSV text. Every readable row that the job
    /// accepts is added; the others are reported with their line numbers.
    /// Imported recipients get `document_ids` assigned.
    pub async fn import_recipients(
        &self,
        job_id: Uuid,
        csv: &str,
        document_ids: Vec<Uuid>,
    ) -> AppResult<ImportOutcome> {
        let report = self.context.importer.parse_str(csv)?;
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;
        job.ensure_editable()?;

        let mut outcome = ImportOutcome {
            events: Vec::new(),
            rejected: report.rejected,
        };
        for imported in report.accepted {
            let mut recipient = imported.recipient;
            recipient.document_ids = document_ids.clone();
            match job.add_recipient(recipient) {
                Ok(events) => outcome.events.extend(events),
                Err(e) => outcome.rejected.push(ImportRowError {
                    line: imported.line,
                    message: e.to_string(),
                }),
            }
        }
        outcome.rejected.sort_by_key(|r| r.line);

        tracing::info!(
            job_id = %job_id,
            added = outcome.events.len(),
            rejected = outcome.rejected.len(),
            "Recipients imported"
        );
        log_events(job_id, &outcome.events);
        Ok(outcome)
    }

    pub async fn fix_address(&self, job_id: Uuid, recipient_id: Uuid, address: &str) -> CommandResult {
        self.execute(job_id, |job| job.fix_address(recipient_id, address))
            .await
    }

    pub async fn skip_exception(
        &self,
        job_id: Uuid,
        recipient_id: Uuid,
        actor: &str,
        justification: &str,
    ) -> CommandResult {
        self.execute(job_id, |job| {
            job.skip_exception(recipient_id, actor, justification)
        })
        .await
    }

    /// Start validating every recipient address of the job in the background.
    ///
    /// The job refuses edits until the run finishes or is cancelled.
    pub async fn start_validation(&self, job_id: Uuid) -> AppResult<ValidationRun> {
        let handle = self.handle(job_id).await?;
        let checks = {
            let mut job = handle.lock().await;
            record_error(job_id, job.begin_validation())?
        };
        tracing::info!(job_id = %job_id, recipients = checks.len(), "Address validation started");

        let (progress_tx, progress_rx) = watch::channel(0u8);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let validator = self.context.validator.clone();

        let task = async move {
            let release = ValidationRelease::new(job_id, handle.clone());
            let outcome = validator.validate(checks, &progress_tx, &run_cancel).await;
            let mut job = handle.lock().await;
            let result = match outcome {
                Ok(records) => {
                    let applied = job.apply_verdicts(records);
                    if applied.is_ok() {
                        for exception in job.exceptions() {
                            log_error(job_id, &AppError::from(exception));
                        }
                    }
                    applied
                }
                Err(AppError::Cancelled(_)) => job.cancel_validation(),
                Err(e) => {
                    if let Err(cancel_error) = job.cancel_validation() {
                        tracing::error!(error = %cancel_error, "Failed to release validation lock");
                    }
                    Err(e)
                }
            };
            release.disarm();
            record(job_id, result)
        };
        let handle = tokio::spawn(task.instrument(tracing::info_span!("validation_run", job_id = %job_id)));

        Ok(ValidationRun {
            job_id,
            progress: progress_rx,
            cancel,
            handle,
        })
    }

    /// Ask the approval authority to sign off and record its decision.
    pub async fn approve(&self, job_id: Uuid) -> CommandResult {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;

        let result: CommandResult = async {
            let request = job.approval_request()?;
            let decision = self
                .context
                .approval
                .review(&request)
                .await
                .map_err(|e| AppError::Provider(format!("Approval authority: {}", e)))?;
            job.approve(decision)
        }
        .await;
        record(job_id, result)
    }

    pub async fn dispatch(&self, job_id: Uuid, plan: DispatchPlan) -> CommandResult {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;
        let result = self.context.ledger.dispatch(&mut job, plan).await;
        record(job_id, result)
    }

    /// Poll the carrier for the job's open shipments and apply what it reports.
    pub async fn refresh_status(&self, job_id: Uuid, cancel: &CancellationToken) -> CommandResult {
        let handle = self.handle(job_id).await?;
        let shipments = handle.lock().await.shipments_to_poll();
        if shipments.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.context.ledger.refresh_status(&shipments, cancel).await?;
        let mut job = handle.lock().await;
        record(job_id, job.apply_tracking_updates(outcome.updates))
    }

    /// Refresh every dispatched job that still has shipments in flight. A
    /// failure on one job does not stop the others.
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> RefreshSummary {
        let handles: Vec<(Uuid, JobHandle)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        let mut summary = RefreshSummary::default();
        for (job_id, handle) in handles {
            if cancel.is_cancelled() {
                break;
            }
            let in_flight = {
                let job = handle.lock().await;
                job.stage() == JobStage::Dispatched && !job.shipments_to_poll().is_empty()
            };
            if !in_flight {
                continue;
            }

            summary.jobs += 1;
            match self.refresh_status(job_id, cancel).await {
                Ok(events) => summary.status_changes += events.len(),
                Err(AppError::Cancelled(_)) => break,
                Err(_) => summary.failed_jobs += 1,
            }
        }
        summary
    }

    pub async fn export_tracking_report(&self, job_id: Uuid) -> AppResult<String> {
        let handle = self.handle(job_id).await?;
        let job = handle.lock().await;
        self.context.ledger.export_tracking_report(&job)
    }
}

/// Clears a job's validation flag if its run ends without reaching a result,
/// which happens when the provider panics or the task is aborted.
struct ValidationRelease {
    job_id: Uuid,
    handle: Option<JobHandle>,
}

impl ValidationRelease {
    fn new(job_id: Uuid, handle: JobHandle) -> Self {
        Self {
            job_id,
            handle: Some(handle),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for ValidationRelease {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let job_id = self.job_id;
        tracing::warn!(job_id = %job_id, "Validation run ended without a result, releasing job");

        if let Ok(mut job) = handle.try_lock() {
            release_validation(job_id, &mut job);
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let mut job = handle.lock().await;
                release_validation(job_id, &mut job);
            });
        }
    }
}

fn release_validation(job_id: Uuid, job: &mut MailJob) {
    if !job.is_validating() {
        return;
    }
    match job.cancel_validation() {
        Ok(events) => log_events(job_id, &events),
        Err(e) => log_error(job_id, &e),
    }
}

fn log_events(job_id: Uuid, events: &[JobEvent]) {
    for event in events {
        match event {
            JobEvent::StageAdvanced { from, to } | JobEvent::StageReverted { from, to } => {
                tracing::info!(job_id = %job_id, from = %from, to = %to, "Job stage changed");
            }
            other => tracing::debug!(job_id = %job_id, event = ?other, "Job event"),
        }
    }
}

fn log_error(job_id: Uuid, error: &AppError) {
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(job_id = %job_id, code = error.error_code(), error = %error, "Command rejected")
        }
        LogLevel::Info => {
            tracing::info!(job_id = %job_id, code = error.error_code(), error = %error, "Command rejected")
        }
        LogLevel::Warn => {
            tracing::warn!(job_id = %job_id, code = error.error_code(), error = %error, "Command failed")
        }
        LogLevel::Error => {
            tracing::error!(job_id = %job_id, error = %error.detailed_message(), "Command failed")
        }
    }
}

fn record_error<T>(job_id: Uuid, result: AppResult<T>) -> AppResult<T> {
    if let Err(e) = &result {
        log_error(job_id, e);
    }
    result
}

fn record(job_id: Uuid, result: CommandResult) -> CommandResult {
    if let Ok(events) = &result {
        log_events(job_id, events);
    }
    record_error(job_id, result)
}
