//! Dispatch and delivery tracking on the job aggregate
//!
//! The carrier is called by the ledger in the services crate. The aggregate
//! only checks that the issued tracking numbers are acceptable and records
//! the status events the carrier reports afterwards.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::CommandResult;
use crate::error::AppError;
use crate::models::{
    CarrierEvent, DeliveryStatus, DispatchPlan, DispatchRecord, DispatchTiming, JobEvent,
    JobRecipient, JobStage, MailJob, Shipment, ShipmentUpdate, TrackingAssignment,
    TrackingEvent, TrackingReportRow,
};

impl MailJob {
    /// Check that the job may be dispatched with `plan` at `now`. Called
    /// before any carrier request is made.
    pub fn guard_dispatch(&self, plan: &DispatchPlan, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.stage != JobStage::Approved {
            return Err(self.wrong_stage_error(JobStage::Approved));
        }
        if let DispatchTiming::Scheduled(at) = plan.timing {
            if at <= now {
                return Err(AppError::InvalidInput(format!(
                    "Scheduled dispatch time {} is not in the future",
                    at.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    /// Whether `tracking_number` may still be issued in this job.
    pub fn is_tracking_number_available(&self, tracking_number: &str) -> bool {
        !self.issued_tracking_numbers.contains(tracking_number)
            && !self
                .recipients
                .iter()
                .any(|r| r.tracking_number.as_deref() == Some(tracking_number))
    }

    /// Record the carrier's tracking numbers and make the job terminal.
    ///
    /// Either every recipient is dispatched or none is: the assignments must
    /// cover each recipient exactly once with numbers never issued before.
    pub fn record_dispatch(
        &mut self,
        plan: DispatchPlan,
        assignments: Vec<TrackingAssignment>,
        now: DateTime<Utc>,
    ) -> CommandResult {
        self.guard_dispatch(&plan, now)?;

        let mut numbers: HashMap<Uuid, String> = HashMap::with_capacity(assignments.len());
        let mut seen = HashSet::with_capacity(assignments.len());
        for assignment in assignments {
            if self.recipient(assignment.recipient_id).is_none() {
                return Err(AppError::not_found("recipient", assignment.recipient_id));
            }
            let number = assignment.tracking_number.trim().to_string();
            if number.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Empty tracking number for recipient {}",
                    assignment.recipient_id
                )));
            }
            if !seen.insert(number.clone()) || !self.is_tracking_number_available(&number) {
                return Err(AppError::InvalidInput(format!(
                    "Tracking number {} is already in use in this job",
                    number
                )));
            }
            if numbers.insert(assignment.recipient_id, number).is_some() {
                return Err(AppError::InvalidInput(format!(
                    "Recipient {} was assigned more than one tracking number",
                    assignment.recipient_id
                )));
            }
        }
        if let Some(missing) = self.recipients.iter().find(|r| !numbers.contains_key(&r.id)) {
            return Err(AppError::InvalidInput(format!(
                "Recipient {} has no tracking number",
                missing.reference
            )));
        }

        let dispatched_at = match plan.timing {
            DispatchTiming::Immediate => now,
            DispatchTiming::Scheduled(at) => at,
        };

        let mut events = Vec::with_capacity(self.recipients.len() + 1);
        for recipient in &mut self.recipients {
            let Some(tracking_number) = numbers.remove(&recipient.id) else {
                continue;
            };
            recipient.tracking_number = Some(tracking_number.clone());
            recipient.delivery_status = Some(DeliveryStatus::InTransit);
            recipient.dispatched_at = Some(dispatched_at);
            recipient.tracking_events.push(TrackingEvent {
                event: CarrierEvent::Created,
                occurred_at: now,
            });
            self.issued_tracking_numbers.insert(tracking_number.clone());
            events.push(JobEvent::Dispatched {
                recipient_id: recipient.id,
                tracking_number,
            });
        }

        self.dispatch = Some(DispatchRecord {
            plan,
            dispatched_at: now,
        });
        events.extend(self.move_to_next(JobStage::Approved)?);
        Ok(events)
    }

    /// Shipments whose status can still change.
    pub fn shipments_to_poll(&self) -> Vec<Shipment> {
        let Some(dispatch) = &self.dispatch else {
            return Vec::new();
        };
        self.recipients
            .iter()
            .filter(|r| !r.delivery_status.is_some_and(|s| s.is_final()))
            .filter_map(|r| {
                r.tracking_number.as_ref().map(|number| Shipment {
                    recipient_id: r.id,
                    tracking_number: number.clone(),
                    carrier: dispatch.plan.carrier,
                })
            })
            .collect()
    }

    /// Apply carrier status events. All updates are checked before any is
    /// applied. Recipients already `Delivered` or in `Exception` keep their
    /// status; their events are ignored.
    pub fn apply_tracking_updates(&mut self, updates: Vec<ShipmentUpdate>) -> CommandResult {
        if self.stage != JobStage::Dispatched {
            return Err(AppError::InvalidInput(
                "Tracking updates require a dispatched job".to_string(),
            ));
        }
        for update in &updates {
            if self.recipient(update.recipient_id).is_none() {
                return Err(AppError::not_found("recipient", update.recipient_id));
            }
        }

        let mut events = Vec::new();
        for update in updates {
            let recipient = self.recipient_mut(update.recipient_id)?;
            for tracking_event in update.events {
                if let Some(status) = apply_carrier_event(recipient, tracking_event) {
                    events.push(JobEvent::DeliveryStatusChanged {
                        recipient_id: recipient.id,
                        status,
                    });
                }
            }
        }
        if !events.is_empty() {
            self.touch();
        }
        Ok(events)
    }

    /// Current recipient state projected into report rows. Pure read.
    pub fn tracking_report(&self) -> Vec<TrackingReportRow> {
        self.recipients
            .iter()
            .map(|r| TrackingReportRow {
                job_id: self.id,
                job_name: self.details.name.clone(),
                recipient_name: r.name.clone(),
                address: r.address.clone(),
                tracking_number: r.tracking_number.clone(),
                status: r.status_label(),
                delivery_date: r.delivered_at,
            })
            .collect()
    }
}

/// Record one carrier event on a recipient and return the new delivery
/// status if it changed.
fn apply_carrier_event(
    recipient: &mut JobRecipient,
    tracking_event: TrackingEvent,
) -> Option<DeliveryStatus> {
    let current = recipient.delivery_status?;
    if current.is_final() {
        return None;
    }

    let next = match &tracking_event.event {
        CarrierEvent::Created | CarrierEvent::PickedUp | CarrierEvent::InTransit => current,
        CarrierEvent::OutForDelivery => DeliveryStatus::OutForDelivery,
        CarrierEvent::Delivered { signature } => {
            recipient.delivered_at = Some(tracking_event.occurred_at);
            recipient.signature = signature.clone();
            DeliveryStatus::Delivered
        }
        CarrierEvent::ExceptionRaised { reason } => {
            recipient.delivery_exception = Some(reason.clone());
            DeliveryStatus::Exception
        }
    };
    recipient.tracking_events.push(tracking_event);

    if next == current {
        return None;
    }
    recipient.delivery_status = Some(next);
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::Precondition;
    use crate::hooks::ApprovalDecision;
    use crate::models::{CarrierService, ValidationStatus};
    use chrono::Duration;

    fn approved_job(count: usize) -> MailJob {
        let mut job = mapped_job(count);
        job.advance().unwrap();
        for r in &mut job.recipients {
            r.validation_status = ValidationStatus::Valid;
        }
        job.advance().unwrap();
        job.approve(ApprovalDecision::approve("compliance")).unwrap();
        job
    }

    fn assignments(job: &MailJob) -> Vec<TrackingAssignment> {
        job.recipients()
            .iter()
            .enumerate()
            .map(|(i, r)| TrackingAssignment {
                recipient_id: r.id,
                tracking_number: format!("9407{:018}", i + 1),
            })
            .collect()
    }

    fn dispatched_job(count: usize) -> MailJob {
        let mut job = approved_job(count);
        let assigned = assignments(&job);
        job.record_dispatch(DispatchPlan::immediate(CarrierService::Usps), assigned, Utc::now())
            .unwrap();
        job
    }

    fn update(recipient_id: Uuid, events: Vec<CarrierEvent>) -> ShipmentUpdate {
        ShipmentUpdate {
            recipient_id,
            events: events.into_iter().map(TrackingEvent::now).collect(),
        }
    }

    #[test]
    fn test_dispatch_requires_approval() {
        let mut job = mapped_job(1);
        let plan = DispatchPlan::immediate(CarrierService::Usps);
        let assigned = assignments(&job);
        let err = job.record_dispatch(plan, assigned, Utc::now()).unwrap_err();
        assert_eq!(err.precondition(), Some(&Precondition::ApprovalRequired));
    }

    #[test]
    fn test_scheduled_in_past_rejected() {
        let job = approved_job(1);
        let now = Utc::now();
        let plan = DispatchPlan {
            carrier: CarrierService::Fedex,
            timing: DispatchTiming::Scheduled(now - Duration::hours(1)),
        };
        assert!(matches!(
            job.guard_dispatch(&plan, now),
            Err(AppError::InvalidInput(_))
        ));

        let plan = DispatchPlan {
            carrier: CarrierService::Fedex,
            timing: DispatchTiming::Scheduled(now + Duration::hours(1)),
        };
        assert!(job.guard_dispatch(&plan, now).is_ok());
    }

    #[test]
    fn test_dispatch_marks_all_in_transit() {
        let job = dispatched_job(3);
        assert_eq!(job.stage(), JobStage::Dispatched);
        let numbers: HashSet<_> = job
            .recipients()
            .iter()
            .map(|r| r.tracking_number.clone().unwrap())
            .collect();
        assert_eq!(numbers.len(), 3);
        for r in job.recipients() {
            assert_eq!(r.delivery_status, Some(DeliveryStatus::InTransit));
            assert!(r.dispatched_at.is_some());
            assert_eq!(r.tracking_events[0].event, CarrierEvent::Created);
        }
        assert_eq!(job.counters().in_transit, 3);
        assert_eq!(job.shipments_to_poll().len(), 3);
    }

    #[test]
    fn test_duplicate_tracking_numbers_rejected_atomically() {
        let mut job = approved_job(2);
        let mut assigned = assignments(&job);
        assigned[1].tracking_number = assigned[0].tracking_number.clone();

        let err = job
            .record_dispatch(DispatchPlan::immediate(CarrierService::Usps), assigned, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(job.stage(), JobStage::Approved);
        assert!(job.recipients().iter().all(|r| r.tracking_number.is_none()));
    }

    #[test]
    fn test_missing_assignment_rejected() {
        let mut job = approved_job(2);
        let mut assigned = assignments(&job);
        assigned.pop();
        assert!(job
            .record_dispatch(DispatchPlan::immediate(CarrierService::Usps), assigned, Utc::now())
            .is_err());
        assert_eq!(job.stage(), JobStage::Approved);
    }

    #[test]
    fn test_delivered_is_final() {
        let mut job = dispatched_job(1);
        let id = job.recipients()[0].id;

        let events = job
            .apply_tracking_updates(vec![update(
                id,
                vec![
                    CarrierEvent::PickedUp,
                    CarrierEvent::OutForDelivery,
                    CarrierEvent::Delivered {
                        signature: Some("J. Doe".to_string()),
                    },
                ],
            )])
            .unwrap();
        assert_eq!(events.len(), 2);

        let events = job
            .apply_tracking_updates(vec![update(
                id,
                vec![
                    CarrierEvent::InTransit,
                    CarrierEvent::ExceptionRaised {
                        reason: "damaged".to_string(),
                    },
                ],
            )])
            .unwrap();
        assert!(events.is_empty());

        let recipient = &job.recipients()[0];
        assert_eq!(recipient.delivery_status, Some(DeliveryStatus::Delivered));
        assert_eq!(recipient.signature.as_deref(), Some("J. Doe"));
        assert!(recipient.delivered_at.is_some());
        assert!(recipient.delivery_exception.is_none());
        assert_eq!(job.counters().delivered, 1);
        assert!(job.shipments_to_poll().is_empty());
    }

    #[test]
    fn test_out_for_delivery_does_not_regress() {
        let mut job = dispatched_job(1);
        let id = job.recipients()[0].id;
        job.apply_tracking_updates(vec![update(
            id,
            vec![CarrierEvent::OutForDelivery, CarrierEvent::InTransit],
        )])
        .unwrap();
        assert_eq!(
            job.recipients()[0].delivery_status,
            Some(DeliveryStatus::OutForDelivery)
        );
        assert_eq!(job.recipients()[0].tracking_events.len(), 3);
    }

    #[test]
    fn test_unknown_recipient_update_applies_nothing() {
        let mut job = dispatched_job(1);
        let id = job.recipients()[0].id;
        let result = job.apply_tracking_updates(vec![
            update(id, vec![CarrierEvent::OutForDelivery]),
            update(Uuid::new_v4(), vec![CarrierEvent::OutForDelivery]),
        ]);
        assert!(matches!(result, Err(AppError::NotFound { .. })));
        assert_eq!(
            job.recipients()[0].delivery_status,
            Some(DeliveryStatus::InTransit)
        );
    }

    #[test]
    fn test_tracking_report_projects_state() {
        let mut job = dispatched_job(2);
        let id = job.recipients()[1].id;
        job.apply_tracking_updates(vec![update(
            id,
            vec![CarrierEvent::ExceptionRaised {
                reason: "address not found".to_string(),
            }],
        )])
        .unwrap();

        let rows = job.tracking_report();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].job_name, "Q4 Compliance Notices");
        assert_eq!(rows[0].status, "in_transit");
        assert_eq!(rows[1].status, "exception");
        assert!(rows.iter().all(|r| r.tracking_number.is_some()));
        assert_eq!(job.counters().exceptions, 1);
    }

    #[test]
    fn test_edits_after_dispatch_rejected() {
        let mut job = dispatched_job(1);
        let id = job.recipients()[0].id;
        let err = job.remove_recipient(id).unwrap_err();
        assert_eq!(err.precondition(), Some(&Precondition::TerminalStage));
        let err = job.go_back().unwrap_err();
        assert_eq!(err.precondition(), Some(&Precondition::TerminalStage));
    }
}
