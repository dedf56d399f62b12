//! Mailroom Core Library
//!
//! This crate provides the domain models, error types, configuration and field
//! validation shared by all Mailroom components, together with the mail-job
//! aggregate whose commands drive a job from details entry through dispatch.
//!
//! Nothing in this crate performs I/O. Address verification, carriers, file
//! storage and approvals are collaborators that live in other crates and feed
//! their results into the aggregate's commands.

pub mod config;
pub mod error;
pub mod hooks;
pub mod job;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel, Precondition};
pub use hooks::{ApprovalAuthority, ApprovalDecision, ApprovalRequest, AutoApprove};
pub use job::{AddressCheck, CommandResult, DocumentRemoval};
pub use storage_types::StorageBackend;

/// Result alias for domain operations.
pub type AppResult<T> = Result<T, AppError>;
