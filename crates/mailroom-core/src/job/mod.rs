//! Mail job commands
//!
//! Each command takes the aggregate and an input, checks every precondition
//! before touching state, and returns the [`JobEvent`]s it produced. A
//! rejected command leaves the job exactly as it was.
//!
//! - [`editing`]: details, documents and recipients (editable stages only)
//! - [`lifecycle`]: stage advancement, backward navigation and approval
//! - [`addresses`]: address validation results and exception resolution
//! - [`delivery`]: dispatch, carrier status events and the tracking report

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{AppError, Precondition};
use crate::models::{JobDetails, JobEvent, JobRecipient, JobStage, MailJob};
use crate::validation::validate_job_details;

pub mod addresses;
pub mod delivery;
pub mod editing;
pub mod lifecycle;

/// Address snapshot handed to the address validator when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCheck {
    pub recipient_id: Uuid,
    pub address: String,
}

/// What to do with recipients that still reference a document being removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentRemoval {
    /// Refuse while any recipient references the document.
    #[default]
    Reject,
    /// Unassign the document from every recipient, then remove it.
    Cascade,
}

pub type CommandResult = Result<Vec<JobEvent>, AppError>;

impl MailJob {
    /// Create a job in the `Details` stage.
    pub fn new(details: JobDetails) -> Result<Self, AppError> {
        validate_job_details(&details)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            details,
            stage: JobStage::Details,
            documents: Vec::new(),
            recipients: Vec::new(),
            recipient_seq: 0,
            validation_in_progress: false,
            approval: None,
            dispatch: None,
            issued_tracking_numbers: BTreeSet::new(),
            overrides: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fails unless recipients and documents may change in the current stage.
    pub fn ensure_editable(&self) -> Result<(), AppError> {
        if self.stage.is_terminal() {
            return Err(Precondition::TerminalStage.into());
        }
        if !self.stage.is_editable() {
            return Err(Precondition::JobLocked { stage: self.stage }.into());
        }
        if self.validation_in_progress {
            return Err(Precondition::ValidationInProgress.into());
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a change to details, documents, recipients or verdicts. Any
    /// approval given for the previous content is dropped.
    pub(crate) fn revise(&mut self, mut events: Vec<JobEvent>) -> Vec<JobEvent> {
        if let Some(previous) = self.approval.take() {
            events.push(JobEvent::ApprovalRevoked {
                approver: previous.approver,
            });
        }
        self.touch();
        events
    }

    pub(crate) fn recipient_index(&self, recipient_id: Uuid) -> Result<usize, AppError> {
        self.recipients
            .iter()
            .position(|r| r.id == recipient_id)
            .ok_or_else(|| AppError::not_found("recipient", recipient_id))
    }

    pub(crate) fn recipient_mut(&mut self, recipient_id: Uuid) -> Result<&mut JobRecipient, AppError> {
        let index = self.recipient_index(recipient_id)?;
        Ok(&mut self.recipients[index])
    }

    pub(crate) fn next_reference(&mut self) -> String {
        self.recipient_seq += 1;
        format!("REC-{:03}", self.recipient_seq)
    }
}
