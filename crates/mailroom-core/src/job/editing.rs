use uuid::Uuid;

use super::{CommandResult, DocumentRemoval};
use crate::error::{AppError, Precondition};
use crate::models::{Document, JobDetails, JobEvent, JobRecipient, MailJob, NewRecipient, RecipientUpdate};
use crate::validation::{validate_job_details, validate_new_recipient, MAX_ADDRESS_LENGTH};

impl MailJob {
    pub fn update_details(&mut self, details: JobDetails) -> CommandResult {
        self.ensure_editable()?;
        validate_job_details(&details)?;
        self.details = details;
        Ok(self.revise(vec![JobEvent::DetailsUpdated]))
    }

    /// Attach already-stored documents to the job.
    pub fn add_documents(&mut self, documents: Vec<Document>) -> CommandResult {
        self.ensure_editable()?;
        if documents.is_empty() {
            return Err(AppError::InvalidInput("No documents supplied".to_string()));
        }
        let events = documents
            .iter()
            .map(|d| JobEvent::DocumentAdded { document_id: d.id })
            .collect();
        self.documents.extend(documents);
        Ok(self.revise(events))
    }

    /// Remove a document. Recipients that reference it either block the
    /// removal or lose the reference, depending on `policy`.
    pub fn remove_document(&mut self, document_id: Uuid, policy: DocumentRemoval) -> CommandResult {
        self.ensure_editable()?;
        let index = self
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or_else(|| AppError::not_found("document", document_id))?;

        let referencing = self
            .recipients
            .iter()
            .filter(|r| r.document_ids.contains(&document_id))
            .count();

        if referencing > 0 && policy == DocumentRemoval::Reject {
            return Err(Precondition::DocumentInUse {
                document_id,
                recipients: referencing,
            }
            .into());
        }

        for recipient in &mut self.recipients {
            recipient.document_ids.retain(|id| *id != document_id);
        }
        self.documents.remove(index);

        Ok(self.revise(vec![JobEvent::DocumentRemoved {
            document_id,
            unassigned_from: referencing,
        }]))
    }

    pub fn add_recipient(&mut self, input: NewRecipient) -> CommandResult {
        self.ensure_editable()?;
        validate_new_recipient(&input)?;
        self.check_document_refs(&input.document_ids)?;

        let reference = self.next_reference();
        let recipient = JobRecipient::from_new(input, reference.clone());
        let recipient_id = recipient.id;
        self.recipients.push(recipient);

        Ok(self.revise(vec![JobEvent::RecipientAdded {
            recipient_id,
            reference,
        }]))
    }

    /// Edit a recipient. Changing the address sends the recipient back to
    /// `Pending` validation.
    pub fn update_recipient(&mut self, recipient_id: Uuid, update: RecipientUpdate) -> CommandResult {
        self.ensure_editable()?;
        let index = self.recipient_index(recipient_id)?;

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidInput("Recipient name is required".to_string()));
            }
        }
        if let Some(address) = &update.address {
            check_address_text(address)?;
        }
        if let Some(document_ids) = &update.document_ids {
            self.check_document_refs(document_ids)?;
        }

        let recipient = &mut self.recipients[index];
        let mut needs_revalidation = false;

        if let Some(name) = update.name {
            recipient.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            recipient.email = Some(email).filter(|e| !e.trim().is_empty());
        }
        if let Some(address) = update.address {
            let address = address.trim().to_string();
            needs_revalidation |= address != recipient.address;
            recipient.address = address;
        }
        if let Some(document_ids) = update.document_ids {
            recipient.document_ids = document_ids;
        }
        if let Some(delivery_type) = update.delivery_type {
            recipient.delivery_type = delivery_type;
        }
        if needs_revalidation {
            recipient.reset_validation();
        }

        Ok(self.revise(vec![JobEvent::RecipientUpdated { recipient_id }]))
    }

    pub fn assign_documents(&mut self, recipient_id: Uuid, document_ids: Vec<Uuid>) -> CommandResult {
        self.update_recipient(
            recipient_id,
            RecipientUpdate {
                document_ids: Some(document_ids),
                ..Default::default()
            },
        )
    }

    pub fn remove_recipient(&mut self, recipient_id: Uuid) -> CommandResult {
        self.ensure_editable()?;
        let index = self.recipient_index(recipient_id)?;
        self.recipients.remove(index);
        Ok(self.revise(vec![JobEvent::RecipientRemoved { recipient_id }]))
    }

    fn check_document_refs(&self, document_ids: &[Uuid]) -> Result<(), AppError> {
        for id in document_ids {
            if self.document(*id).is_none() {
                return Err(AppError::not_found("document", id));
            }
        }
        Ok(())
    }
}

pub(crate) fn check_address_text(address: &str) -> Result<(), AppError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Mailing address is required".to_string()));
    }
    if trimmed.len() > MAX_ADDRESS_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Mailing address exceeds {} characters",
            MAX_ADDRESS_LENGTH
        )));
    }
    Ok(())
}
