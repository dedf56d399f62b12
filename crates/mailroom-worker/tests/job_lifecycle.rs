//! End-to-end scenarios: a job driven through the registry with real
//! services, a seeded carrier and in-memory document storage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use mailroom_core::models::{
    CarrierEvent, CarrierService, DeliveryStatus, DispatchPlan, DispatchTiming, JobDetails,
    JobEvent, JobPriority, JobStage, NewRecipient, Shipment, Verdict, ShipmentUpdate, TrackingEvent,
    ValidationStatus,
};
use mailroom_core::{
    ApprovalAuthority, ApprovalDecision, ApprovalRequest, AppError, AutoApprove, Config,
    DocumentRemoval, Precondition, StorageBackend,
};
use mailroom_services::{
    AddressProvider, AddressValidator, CarrierProvider, DispatchLedger, DispatchRequest, DocumentIntake, DocumentUpload, EstimatingPageCounter,
    RecipientDirectory, RecipientImporter, RuleBasedProvider, SimulatedCarrier,
    SimulatedCarrierConfig, SuiteRequirement,
};
use mailroom_storage::MemoryStorage;
use mailroom_worker::{JobRegistry, StatusPoller, WorkerContext};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const NOTICE_PDF: &[u8] = b"%PDF-1.4 << /Type /Page >> << /Type /Page >>";

fn details() -> JobDetails {
    JobDetails {
        name: "Q4 Compliance Notices".to_string(),
        jurisdiction_code: "IL".to_string(),
        due_date: NaiveDate::from_ymd_opt(2030, 12, 15).unwrap(),
        priority: JobPriority::High,
    }
}

fn certain_delivery() -> SimulatedCarrierConfig {
    SimulatedCarrierConfig {
        delivery_probability: 1.0,
        exception_probability: 0.0,
        outage_probability: 0.0,
    }
}

fn context(
    carrier: SimulatedCarrierConfig,
    step_delay: Duration,
    approval: Arc<dyn ApprovalAuthority>,
) -> WorkerContext {
    let provider = RuleBasedProvider::new()
        .with_suite_requirement(SuiteRequirement::new("100 Main St", "Suite 100"));
    WorkerContext {
        directory: Arc::new(RecipientDirectory::new()),
        intake: Arc::new(DocumentIntake::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(EstimatingPageCounter),
            1024 * 1024,
            vec!["pdf".to_string()],
        )),
        validator: Arc::new(AddressValidator::new(Arc::new(provider)).with_step_delay(step_delay)),
        ledger: Arc::new(DispatchLedger::new(Arc::new(SimulatedCarrier::with_seed(
            carrier, 17,
        )))),
        approval,
        importer: RecipientImporter::default(),
    }
}

fn registry() -> JobRegistry {
    JobRegistry::new(context(
        certain_delivery(),
        Duration::ZERO,
        Arc::new(AutoApprove::new("compliance")),
    ))
}

fn recipient(name: &str, address: &str, document_id: Uuid) -> NewRecipient {
    NewRecipient {
        name: name.to_string(),
        address: address.to_string(),
        document_ids: vec![document_id],
        ..Default::default()
    }
}

fn precondition(result: Result<Vec<JobEvent>, AppError>) -> Precondition {
    match result {
        Err(AppError::PreconditionFailed(p)) => p,
        other => panic!("expected a precondition failure, got {:?}", other),
    }
}

/// Create a job, upload one document and leave it in `RecipientsMapped`
/// with the given addresses.
async fn mapped_job(registry: &JobRegistry, addresses: &[&str]) -> (Uuid, Uuid) {
    let job_id = registry.create_job(details()).await.unwrap();
    registry.advance(job_id).await.unwrap();
    let events = registry
        .upload_documents(job_id, vec![DocumentUpload::new("notice.pdf", NOTICE_PDF)])
        .await
        .unwrap();
    let document_id = match events.as_slice() {
        [JobEvent::DocumentAdded { document_id }] => *document_id,
        other => panic!("unexpected events {:?}", other),
    };
    registry.advance(job_id).await.unwrap();
    for (i, address) in addresses.iter().enumerate() {
        registry
            .add_recipient(job_id, recipient(&format!("Recipient {}", i + 1), address, document_id))
            .await
            .unwrap();
    }
    (job_id, document_id)
}

async fn validate(registry: &JobRegistry, job_id: Uuid) -> Vec<JobEvent> {
    registry
        .start_validation(job_id)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap()
}

async fn stage(registry: &JobRegistry, job_id: Uuid) -> JobStage {
    registry.snapshot(job_id).await.unwrap().stage()
}

#[tokio::test]
async fn test_clean_job_walks_all_seven_stages() {
    let registry = registry();
    let job_id = registry.create_job(details()).await.unwrap();
    let mut visited = vec![stage(&registry, job_id).await];

    registry.advance(job_id).await.unwrap();
    visited.push(stage(&registry, job_id).await);
    let events = registry
        .upload_documents(job_id, vec![DocumentUpload::new("notice.pdf", NOTICE_PDF)])
        .await
        .unwrap();
    let JobEvent::DocumentAdded { document_id } = events[0] else {
        panic!("expected DocumentAdded, got {:?}", events);
    };

    registry.advance(job_id).await.unwrap();
    visited.push(stage(&registry, job_id).await);
    for (i, address) in [
        "10 Oak Ave, Springfield, IL 62704",
        "11 Oak Ave, Springfield, IL 62704",
        "12 Oak Ave, Springfield, IL 62704",
    ]
    .iter()
    .enumerate()
    {
        registry
            .add_recipient(job_id, recipient(&format!("Recipient {}", i + 1), address, document_id))
            .await
            .unwrap();
    }

    registry.advance(job_id).await.unwrap();
    visited.push(stage(&registry, job_id).await);
    let run = registry.start_validation(job_id).await.unwrap();
    let progress = run.progress();
    run.wait().await.unwrap();
    assert_eq!(*progress.borrow(), 100);

    registry.advance(job_id).await.unwrap();
    visited.push(stage(&registry, job_id).await);
    let summary = registry.snapshot(job_id).await.unwrap().summary();
    assert_eq!(summary.recipients, 3);
    assert_eq!(summary.mail_pieces, 3);
    assert_eq!(summary.total_pages, 2);

    registry.approve(job_id).await.unwrap();
    visited.push(stage(&registry, job_id).await);
    registry
        .dispatch(job_id, DispatchPlan::immediate(CarrierService::Usps))
        .await
        .unwrap();
    visited.push(stage(&registry, job_id).await);

    assert_eq!(visited, JobStage::ALL.to_vec());

    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.approval().map(|a| a.approver.as_str()), Some("compliance"));
    assert!(job.recipients().iter().all(|r| r.tracking_number.is_some()));
    assert_eq!(job.counters().in_transit, 3);

    registry
        .refresh_status(job_id, &CancellationToken::new())
        .await
        .unwrap();
    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.counters().delivered, 3);

    let report = registry.export_tracking_report(job_id).await.unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1..].iter().all(|l| l.contains(",delivered,")));
}

#[tokio::test]
async fn test_job_without_documents_cannot_leave_upload_stage() {
    let registry = registry();
    let job_id = registry.create_job(details()).await.unwrap();
    registry.advance(job_id).await.unwrap();

    let gate = precondition(registry.advance(job_id).await);
    assert_eq!(gate, Precondition::NoDocuments);
    assert_eq!(stage(&registry, job_id).await, JobStage::DocumentsUploaded);
}

#[tokio::test]
async fn test_missing_suite_is_fixed_with_suggestion() {
    let registry = registry();
    let (job_id, _) = mapped_job(
        &registry,
        &[
            "100 Main Street, Springfield, IL 62701",
            "42 Oak Ave, Springfield, IL 62704",
        ],
    )
    .await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;

    let exceptions = registry.exceptions(job_id).await.unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].reason, "missing suite");
    let fix = exceptions[0].suggested_fix.clone().unwrap();
    assert_eq!(fix, "100 Main St, Suite 100, Springfield, IL 62701");

    let gate = precondition(registry.advance(job_id).await);
    assert_eq!(gate, Precondition::UnresolvedExceptions { count: 1 });

    registry
        .fix_address(job_id, exceptions[0].recipient_id, &fix)
        .await
        .unwrap();
    validate(&registry, job_id).await;
    let job = registry.snapshot(job_id).await.unwrap();
    assert!(job
        .recipients()
        .iter()
        .all(|r| r.validation_status == ValidationStatus::Valid));

    registry.advance(job_id).await.unwrap();
    assert_eq!(stage(&registry, job_id).await, JobStage::Previewed);
}

#[tokio::test]
async fn test_cancelled_validation_leaves_recipients_pending() {
    let registry = JobRegistry::new(context(
        certain_delivery(),
        Duration::from_secs(30),
        Arc::new(AutoApprove::default()),
    ));
    let (job_id, document_id) = mapped_job(
        &registry,
        &[
            "10 Oak Ave, Springfield, IL 62704",
            "11 Oak Ave, Springfield, IL 62704",
        ],
    )
    .await;

    let run = registry.start_validation(job_id).await.unwrap();
    let progress = run.progress();

    let gate = precondition(
        registry
            .add_recipient(job_id, recipient("Late Addition", "1 Elm St, Springfield, IL 62701", document_id))
            .await,
    );
    assert_eq!(gate, Precondition::ValidationInProgress);

    run.cancel();
    let events = run.wait().await.unwrap();
    assert_eq!(events, vec![JobEvent::ValidationCancelled]);
    assert!(*progress.borrow() < 100);

    let job = registry.snapshot(job_id).await.unwrap();
    assert!(!job.is_validating());
    assert!(job
        .recipients()
        .iter()
        .all(|r| r.validation_status == ValidationStatus::Pending));

    registry
        .add_recipient(job_id, recipient("Late Addition", "1 Elm St, Springfield, IL 62701", document_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delivered_status_is_never_regressed() {
    let registry = registry();
    let (job_id, _) = mapped_job(&registry, &["42 Oak Ave, Springfield, IL 62704"]).await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;
    registry.advance(job_id).await.unwrap();
    registry.approve(job_id).await.unwrap();
    registry
        .dispatch(job_id, DispatchPlan::immediate(CarrierService::Ups))
        .await
        .unwrap();
    registry
        .refresh_status(job_id, &CancellationToken::new())
        .await
        .unwrap();

    let job = registry.snapshot(job_id).await.unwrap();
    let delivered = &job.recipients()[0];
    assert_eq!(delivered.delivery_status, Some(DeliveryStatus::Delivered));
    let recipient_id = delivered.id;

    let events = registry
        .execute(job_id, |job| {
            job.apply_tracking_updates(vec![ShipmentUpdate {
                recipient_id,
                events: vec![
                    TrackingEvent::now(CarrierEvent::InTransit),
                    TrackingEvent::now(CarrierEvent::ExceptionRaised {
                        reason: "late scan".to_string(),
                    }),
                ],
            }])
        })
        .await
        .unwrap();
    assert!(events.is_empty());

    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.recipients()[0].delivery_status, Some(DeliveryStatus::Delivered));
    assert!(job.recipients()[0].delivery_exception.is_none());

    // Nothing left to poll.
    let events = registry
        .refresh_status(job_id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(events.is_empty());
}

struct CrashingProvider;

#[async_trait]
impl AddressProvider for CrashingProvider {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn verify(&self, _address: &str) -> anyhow::Result<Verdict> {
        panic!("address provider crashed");
    }
}

#[tokio::test]
async fn test_crashed_validation_run_releases_job() {
    let mut ctx = context(
        certain_delivery(),
        Duration::ZERO,
        Arc::new(AutoApprove::new("compliance")),
    );
    ctx.validator = Arc::new(AddressValidator::new(Arc::new(CrashingProvider)));
    let registry = JobRegistry::new(ctx);
    let (job_id, document_id) = mapped_job(&registry, &["42 Oak Ave, Springfield, IL 62704"]).await;

    let run = registry.start_validation(job_id).await.unwrap();
    let err = run.wait().await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let job = registry.snapshot(job_id).await.unwrap();
    assert!(!job.is_validating());
    assert_eq!(job.recipients()[0].validation_status, ValidationStatus::Pending);
    registry
        .add_recipient(
            job_id,
            recipient("Late Addition", "7 Elm St, Springfield, IL 62702", document_id),
        )
        .await
        .unwrap();
}

/// Creates shipments through the seeded carrier but never answers a poll.
struct HangingCarrier {
    inner: SimulatedCarrier,
    polling: Arc<Notify>,
}

#[async_trait]
impl CarrierProvider for HangingCarrier {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn create_shipment(&self, request: &DispatchRequest) -> anyhow::Result<String> {
        self.inner.create_shipment(request).await
    }

    async fn poll(&self, _shipment: &Shipment) -> anyhow::Result<Vec<TrackingEvent>> {
        self.polling.notify_one();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![TrackingEvent::now(CarrierEvent::Delivered { signature: None })])
    }
}

#[tokio::test]
async fn test_refresh_cancelled_mid_poll_leaves_job_untouched() {
    let polling = Arc::new(Notify::new());
    let mut ctx = context(
        certain_delivery(),
        Duration::ZERO,
        Arc::new(AutoApprove::new("compliance")),
    );
    ctx.ledger = Arc::new(DispatchLedger::new(Arc::new(HangingCarrier {
        inner: SimulatedCarrier::with_seed(certain_delivery(), 5),
        polling: polling.clone(),
    })));
    let registry = Arc::new(JobRegistry::new(ctx));

    let (job_id, _) = mapped_job(
        &registry,
        &["42 Oak Ave, Springfield, IL 62704", "7 Elm St, Springfield, IL 62702"],
    )
    .await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;
    registry.advance(job_id).await.unwrap();
    registry.approve(job_id).await.unwrap();
    registry
        .dispatch(job_id, DispatchPlan::immediate(CarrierService::Fedex))
        .await
        .unwrap();
    let before = registry.snapshot(job_id).await.unwrap();

    let cancel = CancellationToken::new();
    let refresh = tokio::spawn({
        let registry = registry.clone();
        let cancel = cancel.clone();
        async move { registry.refresh_status(job_id, &cancel).await }
    });
    polling.notified().await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), refresh)
        .await
        .expect("refresh should stop once cancelled")
        .unwrap();
    assert!(matches!(result, Err(AppError::Cancelled(_))));

    let after = registry.snapshot(job_id).await.unwrap();
    for (old, new) in before.recipients().iter().zip(after.recipients()) {
        assert_eq!(new.delivery_status, Some(DeliveryStatus::InTransit));
        assert_eq!(new.tracking_events, old.tracking_events);
    }
    assert_eq!(after.counters(), before.counters());
}

struct RejectingAuthority;

#[async_trait]
impl ApprovalAuthority for RejectingAuthority {
    async fn review(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, String> {
        Ok(ApprovalDecision::reject(
            "legal",
            format!("{} override(s) need sign-off", request.overrides),
        ))
    }
}

#[tokio::test]
async fn test_skipped_exception_is_audited_and_rejection_blocks_approval() {
    let registry = JobRegistry::new(context(
        certain_delivery(),
        Duration::ZERO,
        Arc::new(RejectingAuthority),
    ));
    let (job_id, _) = mapped_job(&registry, &["100 Main St, Springfield, IL 62701"]).await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;

    let exception = registry.exceptions(job_id).await.unwrap().remove(0);
    registry
        .skip_exception(job_id, exception.recipient_id, "ops@example.com", "tenant confirmed by phone")
        .await
        .unwrap();

    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.overrides().len(), 1);
    assert_eq!(job.overrides()[0].actor, "ops@example.com");
    assert_eq!(job.recipients()[0].address, "100 Main St, Springfield, IL 62701");
    assert!(job.recipients()[0].accepted_risk.is_some());

    registry.advance(job_id).await.unwrap();
    let gate = precondition(registry.approve(job_id).await);
    assert_eq!(
        gate,
        Precondition::ApprovalDenied {
            reason: Some("1 override(s) need sign-off".to_string())
        }
    );
    assert_eq!(stage(&registry, job_id).await, JobStage::Previewed);

    let gate = precondition(
        registry
            .dispatch(job_id, DispatchPlan::immediate(CarrierService::Usps))
            .await,
    );
    assert_eq!(gate, Precondition::ApprovalRequired);
}

#[tokio::test]
async fn test_document_removal_policies() {
    let registry = registry();
    let (job_id, document_id) =
        mapped_job(&registry, &["42 Oak Ave, Springfield, IL 62704"]).await;

    let gate = precondition(
        registry
            .remove_document(job_id, document_id, DocumentRemoval::Reject)
            .await,
    );
    assert!(matches!(gate, Precondition::DocumentInUse { recipients: 1, .. }));

    registry
        .remove_document(job_id, document_id, DocumentRemoval::Cascade)
        .await
        .unwrap();
    let job = registry.snapshot(job_id).await.unwrap();
    assert!(job.documents().is_empty());
    assert!(job.recipients()[0].document_ids.is_empty());

    let gate = precondition(registry.advance(job_id).await);
    assert!(matches!(gate, Precondition::RecipientWithoutDocuments { .. }));
}

#[tokio::test]
async fn test_import_commits_valid_rows_and_reports_bad_ones() {
    let registry = registry();
    let (job_id, document_id) = mapped_job(&registry, &[]).await;
    let csv = "\
Name,Address,City,State,ZIP,Email,Phone,JurisdictionCode,DeliveryType
Jane Doe,42 Oak Ave,Springfield,IL,62704,jane@example.com,,,
John Roe,5 Pine Rd,Springfield,IL,ABCDE,,,,
Ann Poe,7 Ash Ln,Springfield,IL,62701,,,,priority
";

    let outcome = registry
        .import_recipients(job_id, csv, vec![document_id])
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].line, 3);

    let job = registry.snapshot(job_id).await.unwrap();
    let references: Vec<&str> = job.recipients().iter().map(|r| r.reference.as_str()).collect();
    assert_eq!(references, vec!["REC-001", "REC-002"]);
    assert!(job.recipients().iter().all(|r| r.document_ids == vec![document_id]));
}

#[tokio::test]
async fn test_scheduled_dispatch_in_the_past_is_rejected() {
    let registry = registry();
    let (job_id, _) = mapped_job(&registry, &["42 Oak Ave, Springfield, IL 62704"]).await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;
    registry.advance(job_id).await.unwrap();
    registry.approve(job_id).await.unwrap();

    let plan = DispatchPlan {
        carrier: CarrierService::Fedex,
        timing: DispatchTiming::Scheduled(chrono::Utc::now() - chrono::Duration::hours(1)),
    };
    let result = registry.dispatch(job_id, plan).await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert_eq!(stage(&registry, job_id).await, JobStage::Approved);

    let at = chrono::Utc::now() + chrono::Duration::days(1);
    let plan = DispatchPlan {
        carrier: CarrierService::Fedex,
        timing: DispatchTiming::Scheduled(at),
    };
    registry.dispatch(job_id, plan).await.unwrap();
    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.recipients()[0].dispatched_at, Some(at));
}

#[tokio::test]
async fn test_poller_delivers_in_background() {
    let registry = Arc::new(registry());
    let (job_id, _) = mapped_job(
        &registry,
        &[
            "10 Oak Ave, Springfield, IL 62704",
            "11 Oak Ave, Springfield, IL 62704",
        ],
    )
    .await;
    registry.advance(job_id).await.unwrap();
    validate(&registry, job_id).await;
    registry.advance(job_id).await.unwrap();
    registry.approve(job_id).await.unwrap();
    registry
        .dispatch(job_id, DispatchPlan::immediate(CarrierService::Usps))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let poller = StatusPoller::new(registry.clone(), Duration::from_millis(10)).spawn(cancel.clone());

    let mut delivered = 0;
    for _ in 0..200 {
        delivered = registry.snapshot(job_id).await.unwrap().counters().delivered;
        if delivered == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    poller.await.unwrap();
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn test_context_from_config_with_local_storage_and_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        storage_backend: StorageBackend::Local,
        local_storage_path: Some(dir.path().to_string_lossy().to_string()),
        ..Config::default()
    };
    let directory = RecipientDirectory::from_json(
        r#"{"organizations": [{
            "name": "Acme Corp",
            "addresses": [{"label": "HQ", "full_text": "1 Main St, Springfield, IL 62701", "is_default": true}],
            "contacts": [{"name": "Jane Doe", "email": "jane@acme.example"}]
        }]}"#,
    )
    .unwrap();
    let registry = JobRegistry::new(WorkerContext::from_config(&config, directory).await.unwrap());

    let job_id = registry.create_job(details()).await.unwrap();
    registry.advance(job_id).await.unwrap();
    registry
        .upload_documents(job_id, vec![DocumentUpload::new("notice.pdf", NOTICE_PDF)])
        .await
        .unwrap();
    let job = registry.snapshot(job_id).await.unwrap();
    let document = &job.documents()[0];
    assert!(dir.path().join(&document.storage_key).exists());
    assert_eq!(document.page_count, 2);

    registry.advance(job_id).await.unwrap();
    let contact = registry.context().directory.search("jane").await.remove(0).contact;
    registry
        .add_recipient_from_contact(
            job_id,
            contact.id,
            None,
            vec![document.id],
            Default::default(),
        )
        .await
        .unwrap();
    let job = registry.snapshot(job_id).await.unwrap();
    assert_eq!(job.recipients()[0].name, "Jane Doe");
    assert_eq!(job.recipients()[0].address, "1 Main St, Springfield, IL 62701");
    assert_eq!(job.recipients()[0].organization_id, Some(contact.organization_id));
}
