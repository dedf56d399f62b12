use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::document::Document;
use super::events::AddressOverride;
use super::recipient::{JobRecipient, ValidationStatus};
use super::tracking::DispatchPlan;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Low,
    #[default]
    Standard,
    High,
    Urgent,
}

impl Display for JobPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobPriority::Low => write!(f, "low"),
            JobPriority::Standard => write!(f, "standard"),
            JobPriority::High => write!(f, "high"),
            JobPriority::Urgent => write!(f, "urgent"),
        }
    }
}

impl FromStr for JobPriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "standard" => Ok(JobPriority::Standard),
            "high" => Ok(JobPriority::High),
            "urgent" => Ok(JobPriority::Urgent),
            _ => Err(anyhow::anyhow!("Invalid job priority: {}", s)),
        }
    }
}

/// Lifecycle stage of a mail job, in order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    #[default]
    Details,
    DocumentsUploaded,
    RecipientsMapped,
    Validated,
    Previewed,
    Approved,
    Dispatched,
}

impl JobStage {
    pub const ALL: [JobStage; 7] = [
        JobStage::Details,
        JobStage::DocumentsUploaded,
        JobStage::RecipientsMapped,
        JobStage::Validated,
        JobStage::Previewed,
        JobStage::Approved,
        JobStage::Dispatched,
    ];

    /// Zero-based position in the lifecycle.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<JobStage> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    pub fn previous(&self) -> Option<JobStage> {
        self.ordinal().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Recipients and documents may only change in these stages.
    pub fn is_editable(&self) -> bool {
        *self <= JobStage::Validated
    }

    pub fn is_terminal(&self) -> bool {
        *self == JobStage::Dispatched
    }
}

impl Display for JobStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStage::Details => write!(f, "details"),
            JobStage::DocumentsUploaded => write!(f, "documents_uploaded"),
            JobStage::RecipientsMapped => write!(f, "recipients_mapped"),
            JobStage::Validated => write!(f, "validated"),
            JobStage::Previewed => write!(f, "previewed"),
            JobStage::Approved => write!(f, "approved"),
            JobStage::Dispatched => write!(f, "dispatched"),
        }
    }
}

/// Job metadata entered in the details stage.
#[derive(Debug, Clone, PartialEq, Eq, Validate, Serialize, Deserialize)]
pub struct JobDetails {
    #[validate(length(min = 1, max = 200, message = "Job name is required"))]
    pub name: String,
    #[validate(length(min = 2, max = 16, message = "Jurisdiction code is required"))]
    pub jurisdiction_code: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub priority: JobPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver: String,
    pub comment: Option<String>,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub plan: DispatchPlan,
    pub dispatched_at: DateTime<Utc>,
}

/// Delivery counters, always recomputed from recipient state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: usize,
    pub delivered: usize,
    pub in_transit: usize,
    pub exceptions: usize,
}

/// Pre-approval overview of what the job will send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub recipients: usize,
    pub documents: usize,
    pub total_pages: u64,
    /// One mail piece per recipient per assigned document.
    pub mail_pieces: usize,
    pub by_delivery_type: BTreeMap<String, usize>,
    pub by_validation_status: BTreeMap<String, usize>,
}

/// The mail job aggregate. It exclusively owns its documents and recipients;
/// every mutation goes through the commands in [`crate::job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailJob {
    pub(crate) id: Uuid,
    pub(crate) details: JobDetails,
    pub(crate) stage: JobStage,
    pub(crate) documents: Vec<Document>,
    pub(crate) recipients: Vec<JobRecipient>,
    /// Last issued recipient sequence number. Never decremented.
    pub(crate) recipient_seq: u32,
    pub(crate) validation_in_progress: bool,
    pub(crate) approval: Option<ApprovalRecord>,
    pub(crate) dispatch: Option<DispatchRecord>,
    pub(crate) issued_tracking_numbers: BTreeSet<String>,
    pub(crate) overrides: Vec<AddressOverride>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl MailJob {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn details(&self) -> &JobDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn stage(&self) -> JobStage {
        self.stage
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, document_id: Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == document_id)
    }

    pub fn recipients(&self) -> &[JobRecipient] {
        &self.recipients
    }

    pub fn recipient(&self, recipient_id: Uuid) -> Option<&JobRecipient> {
        self.recipients.iter().find(|r| r.id == recipient_id)
    }

    pub fn is_validating(&self) -> bool {
        self.validation_in_progress
    }

    pub fn approval(&self) -> Option<&ApprovalRecord> {
        self.approval.as_ref()
    }

    pub fn dispatch_record(&self) -> Option<&DispatchRecord> {
        self.dispatch.as_ref()
    }

    pub fn overrides(&self) -> &[AddressOverride] {
        &self.overrides
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn counters(&self) -> JobCounters {
        use super::recipient::DeliveryStatus;

        let mut counters = JobCounters {
            total: self.recipients.len(),
            ..Default::default()
        };
        for recipient in &self.recipients {
            match recipient.delivery_status {
                Some(DeliveryStatus::Delivered) => counters.delivered += 1,
                Some(DeliveryStatus::InTransit | DeliveryStatus::OutForDelivery) => {
                    counters.in_transit += 1
                }
                Some(DeliveryStatus::Exception) => counters.exceptions += 1,
                None => {}
            }
        }
        counters
    }

    pub fn summary(&self) -> JobSummary {
        let mut summary = JobSummary {
            recipients: self.recipients.len(),
            documents: self.documents.len(),
            ..Default::default()
        };
        let mut assigned = BTreeSet::new();
        for recipient in &self.recipients {
            summary.mail_pieces += recipient.document_ids.len();
            assigned.extend(recipient.document_ids.iter().copied());
            *summary
                .by_delivery_type
                .entry(recipient.delivery_type.to_string())
                .or_default() += 1;
            *summary
                .by_validation_status
                .entry(recipient.validation_status.to_string())
                .or_default() += 1;
        }
        summary.total_pages = self
            .documents
            .iter()
            .filter(|d| assigned.contains(&d.id))
            .map(|d| d.page_count as u64)
            .sum();
        summary
    }

    pub(crate) fn count_with_status(&self, status: ValidationStatus) -> usize {
        self.recipients
            .iter()
            .filter(|r| r.validation_status == status)
            .count()
    }
}
