use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobStage;
use super::recipient::DeliveryStatus;

/// Audit record for an address exception accepted without correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressOverride {
    pub recipient_id: Uuid,
    pub address: String,
    pub original_reason: String,
    pub justification: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

/// What a job command changed. Every successful command returns the events
/// it produced; a rejected command produces none and changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum JobEvent {
    DetailsUpdated,
    DocumentAdded {
        document_id: Uuid,
    },
    DocumentRemoved {
        document_id: Uuid,
        unassigned_from: usize,
    },
    RecipientAdded {
        recipient_id: Uuid,
        reference: String,
    },
    RecipientUpdated {
        recipient_id: Uuid,
    },
    RecipientRemoved {
        recipient_id: Uuid,
    },
    StageAdvanced {
        from: JobStage,
        to: JobStage,
    },
    StageReverted {
        from: JobStage,
        to: JobStage,
    },
    ValidationStarted {
        recipients: usize,
    },
    ValidationCancelled,
    AddressValidated {
        recipient_id: Uuid,
    },
    AddressCorrected {
        recipient_id: Uuid,
        corrected_address: String,
    },
    AddressExceptionRaised {
        recipient_id: Uuid,
        reason: String,
    },
    AddressFixed {
        recipient_id: Uuid,
    },
    ExceptionSkipped {
        recipient_id: Uuid,
        actor: String,
    },
    Approved {
        approver: String,
    },
    /// The job's content changed after approval; it must be approved again.
    ApprovalRevoked {
        approver: String,
    },
    Dispatched {
        recipient_id: Uuid,
        tracking_number: String,
    },
    DeliveryStatusChanged {
        recipient_id: Uuid,
        status: DeliveryStatus,
    },
}
