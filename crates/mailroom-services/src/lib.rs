//! Mailroom Services Layer
//!
//! Business services that sit between the pure job aggregate in
//! `mailroom-core` and the outside world: the recipient directory, document
//! intake backed by `mailroom-storage`, address validation, carrier dispatch
//! and tracking, and CSV import/export. The worker crate drives these
//! services under its per-job locking; nothing here holds a job lock itself.

pub mod address;
pub mod carrier;
pub mod directory;
pub mod import;
pub mod intake;
pub mod ledger;

pub use address::rules::{RuleBasedProvider, SuiteRequirement};
pub use address::{AddressProvider, AddressValidator};
pub use carrier::simulated::{SimulatedCarrier, SimulatedCarrierConfig};
pub use carrier::{generate_tracking_number, is_valid_tracking_number, CarrierProvider, DispatchRequest};
pub use directory::RecipientDirectory;
pub use import::{import_template, RecipientImporter};
pub use intake::page_count::{EstimatingPageCounter, PageCounter};
pub use intake::{DocumentIntake, DocumentUpload};
pub use ledger::{render_tracking_csv, DispatchLedger, RefreshOutcome};
pub use mailroom_storage::{create_storage, Storage, StorageError};
