//! Mailroom worker
//!
//! Runtime side of the mail workflow: the [`JobRegistry`] that serializes
//! commands per job, background address-validation runs with progress and
//! cancellation, and the periodic carrier [`StatusPoller`].

pub mod context;
pub mod poller;
pub mod registry;

pub use context::WorkerContext;
pub use poller::StatusPoller;
pub use registry::{ImportOutcome, JobRegistry, RefreshSummary, ValidationRun};
