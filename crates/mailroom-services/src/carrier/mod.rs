//! Carrier collaborators
//!
//! A [`CarrierProvider`] creates one shipment per recipient and is polled for
//! status events afterwards. Tracking numbers follow each carrier's public
//! format so they can be checked before they are recorded on a job.

pub mod simulated;

use async_trait::async_trait;
use mailroom_core::models::{CarrierService, DeliveryType, Shipment, TrackingEvent};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

const UPS_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// What the carrier needs to create a shipment for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub job_id: Uuid,
    pub recipient_id: Uuid,
    pub reference: String,
    pub name: String,
    pub address: String,
    pub delivery_type: DeliveryType,
    pub carrier: CarrierService,
}

#[async_trait]
pub trait CarrierProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Create a shipment and return its tracking number.
    async fn create_shipment(&self, request: &DispatchRequest) -> anyhow::Result<String>;

    /// Status events for a shipment since the last poll, oldest first.
    async fn poll(&self, shipment: &Shipment) -> anyhow::Result<Vec<TrackingEvent>>;
}

/// Random tracking number in `carrier`'s format.
///
/// - USPS: 22 digits starting with `9407`
/// - FedEx: 12 digits
/// - UPS: `1Z` followed by 16 upper-case letters or digits
pub fn generate_tracking_number<R: Rng>(carrier: CarrierService, rng: &mut R) -> String {
    let digits = |rng: &mut R, n: usize| -> String {
        (0..n)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect()
    };
    match carrier {
        CarrierService::Usps => format!("9407{}", digits(rng, 18)),
        CarrierService::Fedex => digits(rng, 12),
        CarrierService::Ups => {
            let body: String = (0..16)
                .map(|_| char::from(UPS_ALPHABET[rng.random_range(0..UPS_ALPHABET.len())]))
                .collect();
            format!("1Z{}", body)
        }
    }
}

/// Whether `tracking_number` has `carrier`'s format.
pub fn is_valid_tracking_number(carrier: CarrierService, tracking_number: &str) -> bool {
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    match carrier {
        CarrierService::Usps => {
            tracking_number.len() == 22
                && tracking_number.starts_with("9407")
                && all_digits(tracking_number)
        }
        CarrierService::Fedex => tracking_number.len() == 12 && all_digits(tracking_number),
        CarrierService::Ups => {
            tracking_number.len() == 18
                && tracking_number.starts_with("1Z")
                && tracking_number[2..]
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
    }
}
