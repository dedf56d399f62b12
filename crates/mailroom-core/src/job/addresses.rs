//! Address validation results and exception resolution
//!
//! A validation run is split in two commands so the aggregate never waits on
//! the provider: [`MailJob::begin_validation`] snapshots the addresses and
//! marks the job busy, [`MailJob::apply_verdicts`] or
//! [`MailJob::cancel_validation`] ends the run.

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::editing::check_address_text;
use super::{AddressCheck, CommandResult};
use crate::error::{AppError, Precondition};
use crate::models::{
    AcceptedRisk, AddressException, AddressIssue, AddressOverride, JobEvent, MailJob,
    ValidationStatus, Verdict, VerdictRecord,
};

/// Reason recorded for a recipient the provider returned nothing for.
pub const MISSING_VERDICT_REASON: &str = "no verdict returned by address provider";

impl MailJob {
    /// Start a validation run. Every recipient goes back to `Pending` and the
    /// job stays locked for edits until the run is applied or cancelled.
    pub fn begin_validation(&mut self) -> Result<Vec<AddressCheck>, AppError> {
        self.ensure_editable()?;
        if self.recipients.is_empty() {
            return Err(Precondition::NoRecipients.into());
        }

        let checks = self
            .recipients
            .iter()
            .map(|r| AddressCheck {
                recipient_id: r.id,
                address: r.address.clone(),
            })
            .collect();
        for recipient in &mut self.recipients {
            recipient.reset_validation();
        }
        self.validation_in_progress = true;
        self.approval = None;
        self.touch();
        Ok(checks)
    }

    /// Apply the provider's verdicts in one step. Recipients without a
    /// verdict become exceptions so none stays `Pending`.
    pub fn apply_verdicts(&mut self, verdicts: Vec<VerdictRecord>) -> CommandResult {
        if !self.validation_in_progress {
            return Err(AppError::InvalidInput(
                "No address validation run in progress".to_string(),
            ));
        }

        let mut by_recipient: HashMap<Uuid, Verdict> = HashMap::with_capacity(verdicts.len());
        for record in verdicts {
            if self.recipient(record.recipient_id).is_none() {
                return Err(AppError::not_found("recipient", record.recipient_id));
            }
            by_recipient.insert(record.recipient_id, record.verdict);
        }

        let mut events = Vec::with_capacity(self.recipients.len());
        for recipient in &mut self.recipients {
            let verdict = by_recipient
                .remove(&recipient.id)
                .unwrap_or_else(|| Verdict::exception(MISSING_VERDICT_REASON, None));

            match verdict {
                Verdict::Valid => {
                    recipient.validation_status = ValidationStatus::Valid;
                    recipient.issue = None;
                    events.push(JobEvent::AddressValidated {
                        recipient_id: recipient.id,
                    });
                }
                Verdict::AutoCorrected { corrected_address } => {
                    recipient.address = corrected_address.clone();
                    recipient.validation_status = ValidationStatus::Valid;
                    recipient.issue = None;
                    events.push(JobEvent::AddressCorrected {
                        recipient_id: recipient.id,
                        corrected_address,
                    });
                }
                Verdict::Exception {
                    reason,
                    suggested_fix,
                } => {
                    recipient.validation_status = ValidationStatus::Exception;
                    recipient.issue = Some(AddressIssue {
                        reason: reason.clone(),
                        suggested_fix,
                    });
                    events.push(JobEvent::AddressExceptionRaised {
                        recipient_id: recipient.id,
                        reason,
                    });
                }
            }
        }

        self.validation_in_progress = false;
        self.touch();
        Ok(events)
    }

    /// Abandon a run. Partial results are never applied, so every recipient
    /// stays `Pending`.
    pub fn cancel_validation(&mut self) -> CommandResult {
        if !self.validation_in_progress {
            return Err(AppError::InvalidInput(
                "No address validation run in progress".to_string(),
            ));
        }
        self.validation_in_progress = false;
        self.touch();
        Ok(vec![JobEvent::ValidationCancelled])
    }

    /// Open address exceptions, in recipient order.
    pub fn exceptions(&self) -> Vec<AddressException> {
        self.recipients
            .iter()
            .filter(|r| r.validation_status == ValidationStatus::Exception)
            .map(|r| {
                let issue = r.issue.clone().unwrap_or(AddressIssue {
                    reason: "unknown".to_string(),
                    suggested_fix: None,
                });
                AddressException {
                    recipient_id: r.id,
                    reference: r.reference.clone(),
                    recipient_name: r.name.clone(),
                    address: r.address.clone(),
                    reason: issue.reason,
                    suggested_fix: issue.suggested_fix,
                }
            })
            .collect()
    }

    /// Replace an exception's address with a corrected one and mark it valid.
    pub fn fix_address(&mut self, recipient_id: Uuid, new_address: &str) -> CommandResult {
        self.ensure_editable()?;
        check_address_text(new_address)?;
        let recipient = self.recipient_mut(recipient_id)?;
        if recipient.validation_status != ValidationStatus::Exception {
            return Err(AppError::InvalidInput(format!(
                "Recipient {} has no address exception",
                recipient.reference
            )));
        }

        recipient.address = new_address.trim().to_string();
        recipient.validation_status = ValidationStatus::Valid;
        recipient.issue = None;
        Ok(self.revise(vec![JobEvent::AddressFixed { recipient_id }]))
    }

    /// Accept an exception without correcting the address. The decision is
    /// kept on the job's audit trail.
    pub fn skip_exception(
        &mut self,
        recipient_id: Uuid,
        actor: &str,
        justification: &str,
    ) -> CommandResult {
        self.ensure_editable()?;
        if actor.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "An actor is required to skip an address exception".to_string(),
            ));
        }
        let recipient = self.recipient_mut(recipient_id)?;
        if recipient.validation_status != ValidationStatus::Exception {
            return Err(AppError::InvalidInput(format!(
                "Recipient {} has no address exception",
                recipient.reference
            )));
        }

        let now = Utc::now();
        let original_reason = recipient
            .issue
            .take()
            .map(|i| i.reason)
            .unwrap_or_default();
        recipient.validation_status = ValidationStatus::Valid;
        recipient.accepted_risk = Some(AcceptedRisk {
            reason: original_reason.clone(),
            accepted_by: actor.to_string(),
            accepted_at: now,
        });
        let address = recipient.address.clone();

        self.overrides.push(AddressOverride {
            recipient_id,
            address,
            original_reason,
            justification: justification.to_string(),
            actor: actor.to_string(),
            recorded_at: now,
        });
        Ok(self.revise(vec![JobEvent::ExceptionSkipped {
            recipient_id,
            actor: actor.to_string(),
        }]))
    }
}
