//! Support code for the `mailroom` binary: tracing setup, the bundled
//! directory seed and the end-to-end job simulation.

use std::path::Path;
use std::sync::Arc;

use chrono::{Days, Utc};
use mailroom_core::models::{
    CarrierService, DispatchPlan, JobCounters, JobDetails, JobPriority, JobStage, NewRecipient,
};
use mailroom_core::{AppError, AppResult, Config};
use mailroom_services::{
    AddressValidator, DispatchLedger, DocumentUpload, RecipientDirectory, RuleBasedProvider,
    SimulatedCarrier, SimulatedCarrierConfig, SuiteRequirement,
};
use mailroom_worker::{JobRegistry, WorkerContext};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Directory used when no seed file is given.
pub const BUNDLED_DIRECTORY: &str = include_str!("../data/directory.json");

/// Actor recorded when the simulation accepts an exception it cannot fix.
const SIMULATION_ACTOR: &str = "mailroom-simulator";

/// Initialize tracing for the CLI.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Shorten `s` to at most `max_chars` characters for table output.
pub fn truncate_cell(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

pub fn load_directory(seed: Option<&Path>) -> AppResult<RecipientDirectory> {
    match seed {
        Some(path) => RecipientDirectory::from_json(&std::fs::read_to_string(path)?),
        None => RecipientDirectory::from_json(BUNDLED_DIRECTORY),
    }
}

/// Buildings in the bundled directory that need a suite designation.
pub fn suite_requirements() -> Vec<SuiteRequirement> {
    vec![SuiteRequirement::new("100 Main St", "Suite 100")]
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub recipients: usize,
    pub carrier: CarrierService,
    /// Seed for the simulated carrier; random when absent.
    pub seed: Option<u64>,
    /// Carrier polling rounds before the report is taken.
    pub poll_rounds: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            recipients: 5,
            carrier: CarrierService::Usps,
            seed: None,
            poll_rounds: 5,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub job_id: Uuid,
    pub stages: Vec<JobStage>,
    pub fixed_addresses: usize,
    pub accepted_exceptions: usize,
    pub counters: JobCounters,
    pub tracking_report: String,
}

/// Drive one job from details entry to dispatch and poll the carrier.
///
/// Exceptions with a suggested fix get the fix; the rest are accepted on
/// the simulator's behalf so the job can proceed.
#[tracing::instrument(skip_all, fields(recipients = options.recipients))]
pub async fn simulate(
    config: &Config,
    directory: RecipientDirectory,
    options: SimulationOptions,
) -> AppResult<SimulationReport> {
    if options.recipients == 0 {
        return Err(AppError::InvalidInput(
            "A simulation needs at least one recipient".to_string(),
        ));
    }

    let mut context = WorkerContext::from_config(config, directory).await?;
    let provider = suite_requirements()
        .into_iter()
        .fold(RuleBasedProvider::new(), |p, r| p.with_suite_requirement(r));
    context.validator = Arc::new(
        AddressValidator::new(Arc::new(provider)).with_step_delay(config.validation_step_delay()),
    );
    if let Some(seed) = options.seed {
        let carrier = SimulatedCarrier::with_seed(SimulatedCarrierConfig::from(config), seed);
        context.ledger = Arc::new(DispatchLedger::new(Arc::new(carrier)));
    }
    let registry = JobRegistry::new(context);

    let job_id = registry
        .create_job(JobDetails {
            name: format!("Simulated notices {}", Utc::now().format("%Y-%m-%d")),
            jurisdiction_code: "IL".to_string(),
            due_date: Utc::now()
                .date_naive()
                .checked_add_days(Days::new(30))
                .unwrap_or_else(|| Utc::now().date_naive()),
            priority: JobPriority::Standard,
        })
        .await?;
    let mut stages = vec![JobStage::Details];

    registry.advance(job_id).await?;
    stages.push(JobStage::DocumentsUploaded);
    let notice = b"%PDF-1.4\n<< /Type /Page >>\n<< /Type /Page >>\n%%EOF".to_vec();
    registry
        .upload_documents(job_id, vec![DocumentUpload::new("notice.pdf", notice)])
        .await?;
    let document_ids: Vec<Uuid> = registry
        .snapshot(job_id)
        .await?
        .documents()
        .iter()
        .map(|d| d.id)
        .collect();

    registry.advance(job_id).await?;
    stages.push(JobStage::RecipientsMapped);
    add_recipients(&registry, job_id, options.recipients, &document_ids).await?;

    registry.advance(job_id).await?;
    stages.push(JobStage::Validated);
    let run = registry.start_validation(job_id).await?;
    let mut progress = run.progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            tracing::debug!(percent, "Validation progress");
        }
    });
    run.wait().await?;
    // The watcher ends once the run drops its progress sender.
    if let Err(e) = watcher.await {
        tracing::debug!(error = %e, "Validation progress watcher failed");
    }

    let mut fixed_addresses = 0;
    let mut accepted_exceptions = 0;
    for exception in registry.exceptions(job_id).await? {
        match &exception.suggested_fix {
            Some(fix) => {
                registry
                    .fix_address(job_id, exception.recipient_id, fix)
                    .await?;
                fixed_addresses += 1;
            }
            None => {
                registry
                    .skip_exception(
                        job_id,
                        exception.recipient_id,
                        SIMULATION_ACTOR,
                        &format!("simulation accepted: {}", exception.reason),
                    )
                    .await?;
                accepted_exceptions += 1;
            }
        }
    }

    registry.advance(job_id).await?;
    stages.push(JobStage::Previewed);
    registry.approve(job_id).await?;
    stages.push(JobStage::Approved);
    registry
        .dispatch(job_id, DispatchPlan::immediate(options.carrier))
        .await?;
    stages.push(JobStage::Dispatched);

    let cancel = CancellationToken::new();
    for _ in 0..options.poll_rounds {
        registry.refresh_status(job_id, &cancel).await?;
        if registry.snapshot(job_id).await?.shipments_to_poll().is_empty() {
            break;
        }
    }

    let job = registry.snapshot(job_id).await?;
    Ok(SimulationReport {
        job_id,
        stages,
        fixed_addresses,
        accepted_exceptions,
        counters: job.counters(),
        tracking_report: registry.export_tracking_report(job_id).await?,
    })
}

/// Add `count` recipients: directory contacts first, then generated ones.
async fn add_recipients(
    registry: &JobRegistry,
    job_id: Uuid,
    count: usize,
    document_ids: &[Uuid],
) -> AppResult<()> {
    let directory = registry.context().directory.clone();
    let contacts = directory.contacts().await;

    for contact in contacts.iter().take(count) {
        registry
            .add_recipient_from_contact(
                job_id,
                contact.id,
                None,
                document_ids.to_vec(),
                Default::default(),
            )
            .await?;
    }
    for n in contacts.len()..count {
        registry
            .add_recipient(
                job_id,
                NewRecipient {
                    name: format!("Occupant {}", n + 1),
                    address: format!("{} Oak Ave, Springfield, IL 62704", 10 + n),
                    document_ids: document_ids.to_vec(),
                    ..Default::default()
                },
            )
            .await?;
    }
    Ok(())
}
