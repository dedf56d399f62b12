//! Job lifecycle state machine
//!
//! Stages advance one at a time in the order of [`JobStage::ALL`]. Each
//! forward step checks the guard of the stage being left:
//!
//! | from | guard |
//! |---|---|
//! | Details | none (details are validated when entered) |
//! | DocumentsUploaded | at least one document |
//! | RecipientsMapped | at least one recipient, each with a document |
//! | Validated | every recipient `Valid` |
//! | Previewed | approval on record, see [`MailJob::approve`] |
//! | Approved | dispatch plan, see [`MailJob::record_dispatch`] |
//!
//! Going back moves the pointer one stage and records nothing else. Changing
//! the job's content afterwards drops its approval.

use chrono::Utc;

use super::CommandResult;
use crate::error::{AppError, Precondition};
use crate::hooks::{ApprovalDecision, ApprovalRequest};
use crate::models::{ApprovalRecord, JobEvent, JobStage, MailJob, ValidationStatus};

impl MailJob {
    /// Advance to the next stage if the current stage's guard passes.
    ///
    /// `Previewed` is left through [`MailJob::approve`], or here when an
    /// approval recorded earlier still stands. `Approved` is left through
    /// [`MailJob::record_dispatch`].
    pub fn advance(&mut self) -> CommandResult {
        if self.validation_in_progress {
            return Err(Precondition::ValidationInProgress.into());
        }
        let from = self.stage;
        match from {
            JobStage::Details => {}
            JobStage::DocumentsUploaded => self.guard_documents()?,
            JobStage::RecipientsMapped => self.guard_recipients()?,
            JobStage::Validated => self.guard_all_valid()?,
            JobStage::Previewed => self.guard_approved()?,
            JobStage::Approved => return Err(Precondition::DispatchPlanRequired.into()),
            JobStage::Dispatched => return Err(Precondition::TerminalStage.into()),
        }
        self.move_to_next(from)
    }

    /// Step back to the immediately preceding stage. Validation verdicts and
    /// approvals already recorded are kept.
    pub fn go_back(&mut self) -> CommandResult {
        if self.stage.is_terminal() {
            return Err(Precondition::TerminalStage.into());
        }
        if self.validation_in_progress {
            return Err(Precondition::ValidationInProgress.into());
        }
        let from = self.stage;
        let to = from.previous().ok_or(Precondition::AtFirstStage)?;
        self.stage = to;
        self.touch();
        Ok(vec![JobEvent::StageReverted { from, to }])
    }

    /// Build the request shown to the approval authority.
    pub fn approval_request(&self) -> Result<ApprovalRequest, AppError> {
        if self.stage != JobStage::Previewed {
            return Err(self.wrong_stage_error(JobStage::Previewed));
        }
        Ok(ApprovalRequest {
            job_id: self.id,
            job_name: self.details.name.clone(),
            jurisdiction_code: self.details.jurisdiction_code.clone(),
            summary: self.summary(),
            overrides: self.overrides.len(),
        })
    }

    /// Leave `Previewed` for `Approved` using the authority's decision.
    pub fn approve(&mut self, decision: ApprovalDecision) -> CommandResult {
        if self.stage != JobStage::Previewed {
            return Err(self.wrong_stage_error(JobStage::Previewed));
        }
        // Recipients cannot change after Validated, but re-check in case the
        // job went back and forward again.
        self.guard_all_valid()?;
        if !decision.approved {
            return Err(Precondition::ApprovalDenied {
                reason: decision.comment,
            }
            .into());
        }
        if decision.approver.trim().is_empty() {
            return Err(AppError::InvalidInput("Approver is required".to_string()));
        }

        self.approval = Some(ApprovalRecord {
            approver: decision.approver.clone(),
            comment: decision.comment,
            approved_at: Utc::now(),
        });
        let mut events = vec![JobEvent::Approved {
            approver: decision.approver,
        }];
        events.extend(self.move_to_next(JobStage::Previewed)?);
        Ok(events)
    }

    pub(crate) fn move_to_next(&mut self, from: JobStage) -> CommandResult {
        let to = from.next().ok_or(Precondition::TerminalStage)?;
        self.stage = to;
        self.touch();
        Ok(vec![JobEvent::StageAdvanced { from, to }])
    }

    /// Error for a stage-specific command issued in another stage.
    pub(crate) fn wrong_stage_error(&self, expected: JobStage) -> AppError {
        if self.stage.is_terminal() {
            return Precondition::TerminalStage.into();
        }
        match expected {
            JobStage::Previewed if self.stage < JobStage::Previewed => {
                AppError::InvalidInput(format!(
                    "Job must be previewed before approval (current stage: {})",
                    self.stage
                ))
            }
            JobStage::Approved if self.stage < JobStage::Approved => {
                Precondition::ApprovalRequired.into()
            }
            _ => AppError::InvalidInput(format!(
                "Operation requires stage {}, job is in {}",
                expected, self.stage
            )),
        }
    }

    fn guard_approved(&self) -> Result<(), AppError> {
        if self.approval.is_none() {
            return Err(Precondition::ApprovalRequired.into());
        }
        self.guard_all_valid()
    }

    fn guard_documents(&self) -> Result<(), AppError> {
        if self.documents.is_empty() {
            return Err(Precondition::NoDocuments.into());
        }
        Ok(())
    }

    fn guard_recipients(&self) -> Result<(), AppError> {
        if self.recipients.is_empty() {
            return Err(Precondition::NoRecipients.into());
        }
        if let Some(r) = self.recipients.iter().find(|r| r.document_ids.is_empty()) {
            return Err(Precondition::RecipientWithoutDocuments {
                reference: r.reference.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn guard_all_valid(&self) -> Result<(), AppError> {
        let exceptions = self.count_with_status(ValidationStatus::Exception);
        if exceptions > 0 {
            return Err(Precondition::UnresolvedExceptions { count: exceptions }.into());
        }
        let pending = self.count_with_status(ValidationStatus::Pending);
        if pending > 0 {
            return Err(Precondition::ValidationIncomplete { pending }.into());
        }
        if self.recipients.is_empty() {
            return Err(Precondition::NoRecipients.into());
        }
        Ok(())
    }
}
