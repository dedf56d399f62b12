//! Data models for the mail workflow
//!
//! Reference data (organizations, contacts), uploaded documents, the
//! recipients of a job and the job itself, plus the records exchanged with
//! address and carrier collaborators.

mod contact;
mod document;
mod events;
mod import;
mod job;
mod organization;
mod recipient;
mod tracking;
mod verdict;

// Re-export all models for convenient imports
pub use contact::*;
pub use document::*;
pub use events::*;
pub use import::*;
pub use job::*;
pub use organization::*;
pub use recipient::*;
pub use tracking::*;
pub use verdict::*;
