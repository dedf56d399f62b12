//! Simulated carrier
//!
//! Issues format-correct tracking numbers and, on each poll, moves a shipment
//! forward at random: delivered, exception, or still travelling. Seeded
//! construction makes the outcome reproducible.

use async_trait::async_trait;
use mailroom_core::models::{CarrierEvent, Shipment, TrackingEvent};
use mailroom_core::Config;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{generate_tracking_number, CarrierProvider, DispatchRequest};

const EXCEPTION_REASONS: [&str; 4] = [
    "addressee unknown",
    "insufficient address",
    "refused by recipient",
    "damaged in transit",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedCarrierConfig {
    /// Chance per poll that an in-transit shipment is delivered.
    pub delivery_probability: f64,
    /// Chance per poll that a shipment raises an exception.
    pub exception_probability: f64,
    /// Chance per call that the carrier itself is unreachable.
    pub outage_probability: f64,
}

impl Default for SimulatedCarrierConfig {
    fn default() -> Self {
        Self {
            delivery_probability: 0.5,
            exception_probability: 0.05,
            outage_probability: 0.0,
        }
    }
}

impl From<&Config> for SimulatedCarrierConfig {
    fn from(config: &Config) -> Self {
        Self {
            delivery_probability: config.carrier_delivery_probability,
            exception_probability: config.carrier_exception_probability,
            outage_probability: 0.0,
        }
    }
}

/// Progress of one simulated shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Created,
    PickedUp,
    OutForDelivery,
    Done,
}

struct State {
    rng: StdRng,
    /// Shipments still in flight. Entries are dropped once delivered or
    /// failed.
    legs: HashMap<String, Leg>,
}

pub struct SimulatedCarrier {
    config: SimulatedCarrierConfig,
    state: Mutex<State>,
}

impl SimulatedCarrier {
    pub fn new(config: SimulatedCarrierConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic carrier for tests and reproducible simulations.
    pub fn with_seed(config: SimulatedCarrierConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulatedCarrierConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                rng,
                legs: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> anyhow::Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("simulated carrier state poisoned"))
    }

    #[cfg(test)]
    fn shipments_in_flight(&self) -> usize {
        self.state.lock().map(|state| state.legs.len()).unwrap_or(0)
    }

    fn check_outage(&self, state: &mut State) -> anyhow::Result<()> {
        if self.config.outage_probability > 0.0
            && state.rng.random_bool(self.config.outage_probability.min(1.0))
        {
            anyhow::bail!("carrier service unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl CarrierProvider for SimulatedCarrier {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn create_shipment(&self, request: &DispatchRequest) -> anyhow::Result<String> {
        let mut state = self.state()?;
        self.check_outage(&mut state)?;
        let tracking_number = generate_tracking_number(request.carrier, &mut state.rng);
        state.legs.insert(tracking_number.clone(), Leg::Created);
        Ok(tracking_number)
    }

    async fn poll(&self, shipment: &Shipment) -> anyhow::Result<Vec<TrackingEvent>> {
        let mut state = self.state()?;
        self.check_outage(&mut state)?;

        // Finished and unknown shipments have nothing new to report.
        let Some(leg) = state.legs.get(&shipment.tracking_number).copied() else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        if leg == Leg::Created {
            events.push(TrackingEvent::now(CarrierEvent::PickedUp));
        }

        let roll: f64 = state.rng.random();
        let next = if roll < self.config.exception_probability {
            let reason = EXCEPTION_REASONS[state.rng.random_range(0..EXCEPTION_REASONS.len())];
            events.push(TrackingEvent::now(CarrierEvent::ExceptionRaised {
                reason: reason.to_string(),
            }));
            Leg::Done
        } else if roll < self.config.exception_probability + self.config.delivery_probability {
            if leg != Leg::OutForDelivery {
                events.push(TrackingEvent::now(CarrierEvent::OutForDelivery));
            }
            let signature = format!("SIG-{:04}", state.rng.random_range(0..10_000));
            events.push(TrackingEvent::now(CarrierEvent::Delivered {
                signature: Some(signature),
            }));
            Leg::Done
        } else if leg == Leg::PickedUp && state.rng.random_bool(0.5) {
            events.push(TrackingEvent::now(CarrierEvent::OutForDelivery));
            Leg::OutForDelivery
        } else {
            events.push(TrackingEvent::now(CarrierEvent::InTransit));
            leg.max_picked_up()
        };

        if next == Leg::Done {
            state.legs.remove(&shipment.tracking_number);
        } else {
            state.legs.insert(shipment.tracking_number.clone(), next);
        }
        Ok(events)
    }
}

impl Leg {
    fn max_picked_up(self) -> Leg {
        match self {
            Leg::Created => Leg::PickedUp,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::is_valid_tracking_number;
    use mailroom_core::models::{CarrierService, DeliveryType};
    use uuid::Uuid;

    fn request(carrier: CarrierService) -> DispatchRequest {
        DispatchRequest {
            job_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            reference: "REC-001".to_string(),
            name: "Jane Doe".to_string(),
            address: "42 Oak Ave, Springfield, IL 62704".to_string(),
            delivery_type: DeliveryType::CertifiedMail,
            carrier,
        }
    }

    fn shipment(tracking_number: String) -> Shipment {
        Shipment {
            recipient_id: Uuid::new_v4(),
            tracking_number,
            carrier: CarrierService::Ups,
        }
    }

    #[tokio::test]
    async fn test_issues_carrier_formatted_numbers() {
        let carrier = SimulatedCarrier::with_seed(SimulatedCarrierConfig::default(), 1);
        let number = carrier
            .create_shipment(&request(CarrierService::Ups))
            .await
            .unwrap();
        assert!(is_valid_tracking_number(CarrierService::Ups, &number));
    }

    #[tokio::test]
    async fn test_certain_delivery() {
        let config = SimulatedCarrierConfig {
            delivery_probability: 1.0,
            exception_probability: 0.0,
            outage_probability: 0.0,
        };
        let carrier = SimulatedCarrier::with_seed(config, 3);
        let number = carrier
            .create_shipment(&request(CarrierService::Usps))
            .await
            .unwrap();
        let shipment = shipment(number);

        let events = carrier.poll(&shipment).await.unwrap();
        assert!(matches!(
            events.last().map(|e| &e.event),
            Some(CarrierEvent::Delivered { signature: Some(_) })
        ));
        assert!(carrier.poll(&shipment).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_certain_exception() {
        let config = SimulatedCarrierConfig {
            delivery_probability: 0.0,
            exception_probability: 1.0,
            outage_probability: 0.0,
        };
        let carrier = SimulatedCarrier::with_seed(config, 3);
        let number = carrier
            .create_shipment(&request(CarrierService::Ups))
            .await
            .unwrap();
        let events = carrier.poll(&shipment(number)).await.unwrap();
        assert!(matches!(
            events.last().map(|e| &e.event),
            Some(CarrierEvent::ExceptionRaised { .. })
        ));
        assert_eq!(carrier.shipments_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_finished_shipments_are_forgotten() {
        let config = SimulatedCarrierConfig {
            delivery_probability: 1.0,
            exception_probability: 0.0,
            outage_probability: 0.0,
        };
        let carrier = SimulatedCarrier::with_seed(config, 11);
        let mut shipments = Vec::new();
        for _ in 0..3 {
            let number = carrier
                .create_shipment(&request(CarrierService::Fedex))
                .await
                .unwrap();
            shipments.push(shipment(number));
        }
        assert_eq!(carrier.shipments_in_flight(), 3);

        for s in &shipments {
            carrier.poll(s).await.unwrap();
        }
        assert_eq!(carrier.shipments_in_flight(), 0);
        assert!(carrier
            .poll(&shipment("1Z999AA10123456784".to_string()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_same_seed_same_outcome() {
        let run = |seed| async move {
            let carrier = SimulatedCarrier::with_seed(SimulatedCarrierConfig::default(), seed);
            let mut outcome = Vec::new();
            for _ in 0..5 {
                let number = carrier
                    .create_shipment(&request(CarrierService::Fedex))
                    .await
                    .unwrap();
                let events = carrier.poll(&shipment(number.clone())).await.unwrap();
                outcome.push((number, events.into_iter().map(|e| e.event).collect::<Vec<_>>()));
            }
            outcome
        };
        assert_eq!(run(42).await, run(42).await);
    }

    #[tokio::test]
    async fn test_outage_is_an_error() {
        let config = SimulatedCarrierConfig {
            outage_probability: 1.0,
            ..Default::default()
        };
        let carrier = SimulatedCarrier::with_seed(config, 9);
        assert!(carrier
            .create_shipment(&request(CarrierService::Usps))
            .await
            .is_err());
    }
}
