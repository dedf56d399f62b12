use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Column headers of the tracking report export.
pub const TRACKING_REPORT_COLUMNS: [&str; 7] = [
    "JobId",
    "JobName",
    "RecipientName",
    "Address",
    "TrackingNumber",
    "Status",
    "DeliveryDate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierService {
    Usps,
    Fedex,
    Ups,
}

impl Display for CarrierService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CarrierService::Usps => write!(f, "usps"),
            CarrierService::Fedex => write!(f, "fedex"),
            CarrierService::Ups => write!(f, "ups"),
        }
    }
}

impl FromStr for CarrierService {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "usps" => Ok(CarrierService::Usps),
            "fedex" => Ok(CarrierService::Fedex),
            "ups" => Ok(CarrierService::Ups),
            _ => Err(anyhow::anyhow!("Invalid carrier: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "at")]
pub enum DispatchTiming {
    Immediate,
    Scheduled(DateTime<Utc>),
}

/// Carrier and timing chosen before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub carrier: CarrierService,
    pub timing: DispatchTiming,
}

impl DispatchPlan {
    pub fn immediate(carrier: CarrierService) -> Self {
        Self {
            carrier,
            timing: DispatchTiming::Immediate,
        }
    }
}

/// Status event reported by a carrier for one shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum CarrierEvent {
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered { signature: Option<String> },
    ExceptionRaised { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub event: CarrierEvent,
    pub occurred_at: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn now(event: CarrierEvent) -> Self {
        Self {
            event,
            occurred_at: Utc::now(),
        }
    }
}

/// Tracking number issued by the carrier for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingAssignment {
    pub recipient_id: Uuid,
    pub tracking_number: String,
}

/// One row of the tracking report export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingReportRow {
    #[serde(rename = "JobId")]
    pub job_id: Uuid,
    #[serde(rename = "JobName")]
    pub job_name: String,
    #[serde(rename = "RecipientName")]
    pub recipient_name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "TrackingNumber")]
    pub tracking_number: Option<String>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "DeliveryDate")]
    pub delivery_date: Option<DateTime<Utc>>,
}

/// Carrier events observed for one shipment since the last poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentUpdate {
    pub recipient_id: Uuid,
    pub events: Vec<TrackingEvent>,
}

/// A dispatched mail piece that has not reached a final status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub recipient_id: Uuid,
    pub tracking_number: String,
    pub carrier: CarrierService,
}
