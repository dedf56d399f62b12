use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::tracking::TrackingEvent;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    #[default]
    CertifiedMail,
    FirstClass,
    Priority,
    Express,
}

impl DeliveryType {
    pub const ALL: [DeliveryType; 4] = [
        DeliveryType::CertifiedMail,
        DeliveryType::FirstClass,
        DeliveryType::Priority,
        DeliveryType::Express,
    ];
}

impl Display for DeliveryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeliveryType::CertifiedMail => write!(f, "certified_mail"),
            DeliveryType::FirstClass => write!(f, "first_class"),
            DeliveryType::Priority => write!(f, "priority"),
            DeliveryType::Express => write!(f, "express"),
        }
    }
}

impl FromStr for DeliveryType {
    type Err = anyhow::Error;

    /// Accepts the snake_case form as well as the spaced labels used in
    /// spreadsheets ("Certified Mail", "First Class").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "certified_mail" | "certified" => Ok(DeliveryType::CertifiedMail),
            "first_class" | "first_class_mail" => Ok(DeliveryType::FirstClass),
            "priority" | "priority_mail" => Ok(DeliveryType::Priority),
            "express" | "express_mail" => Ok(DeliveryType::Express),
            _ => Err(anyhow::anyhow!("Invalid delivery type: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Valid,
    Exception,
}

impl Display for ValidationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Valid => write!(f, "valid"),
            ValidationStatus::Exception => write!(f, "exception"),
        }
    }
}

/// Per-recipient delivery state once the job is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
}

impl DeliveryStatus {
    /// Delivered and Exception are final; the carrier is no longer polled.
    pub fn is_final(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Exception)
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DeliveryStatus::InTransit => write!(f, "in_transit"),
            DeliveryStatus::OutForDelivery => write!(f, "out_for_delivery"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Exception => write!(f, "exception"),
        }
    }
}

/// Unresolved address-validation problem on a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressIssue {
    pub reason: String,
    pub suggested_fix: Option<String>,
}

/// Set when an address exception was accepted without correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedRisk {
    pub reason: String,
    pub accepted_by: String,
    pub accepted_at: DateTime<Utc>,
}

/// Input for adding a recipient to a job.
#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
pub struct NewRecipient {
    #[validate(length(min = 1, max = 200, message = "Recipient name is required"))]
    pub name: String,
    pub organization_id: Option<Uuid>,
    #[validate(email(message = "Recipient email is not a valid address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Mailing address is required"))]
    pub address: String,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    #[serde(default)]
    pub delivery_type: DeliveryType,
}

/// Partial edit of an existing recipient. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub document_ids: Option<Vec<Uuid>>,
    pub delivery_type: Option<DeliveryType>,
}

/// Recipient as assigned to a mail job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecipient {
    pub id: Uuid,
    /// Human-readable reference (`REC-001`), unique within the job.
    pub reference: String,
    pub name: String,
    pub organization_id: Option<Uuid>,
    pub email: Option<String>,
    pub address: String,
    pub document_ids: Vec<Uuid>,
    pub delivery_type: DeliveryType,
    pub validation_status: ValidationStatus,
    pub issue: Option<AddressIssue>,
    pub accepted_risk: Option<AcceptedRisk>,
    pub tracking_number: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_exception: Option<String>,
    pub signature: Option<String>,
    pub tracking_events: Vec<TrackingEvent>,
}

impl JobRecipient {
    pub(crate) fn from_new(input: NewRecipient, reference: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            name: input.name.trim().to_string(),
            organization_id: input.organization_id,
            email: input.email,
            address: input.address.trim().to_string(),
            document_ids: input.document_ids,
            delivery_type: input.delivery_type,
            validation_status: ValidationStatus::Pending,
            issue: None,
            accepted_risk: None,
            tracking_number: None,
            delivery_status: None,
            dispatched_at: None,
            delivered_at: None,
            delivery_exception: None,
            signature: None,
            tracking_events: Vec::new(),
        }
    }

    /// Clear any verdict so the address is checked again.
    pub(crate) fn reset_validation(&mut self) {
        self.validation_status = ValidationStatus::Pending;
        self.issue = None;
        self.accepted_risk = None;
    }

    /// Label used in reports: the delivery status once dispatched, the
    /// validation status before.
    pub fn status_label(&self) -> String {
        match self.delivery_status {
            Some(status) => status.to_string(),
            None => self.validation_status.to_string(),
        }
    }
}
