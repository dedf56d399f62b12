//! Error types module
//!
//! All domain failures are unified under [`AppError`]. Lifecycle guard
//! violations carry a [`Precondition`] describing which gate rejected the
//! transition; per-recipient failures (address exceptions, malformed import
//! rows) have their own variants so callers can aggregate them instead of
//! aborting a job-wide operation.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{AddressException, ImportRowError, JobStage};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like guard rejections
    Debug,
    /// Info level - for per-recipient problems the operator resolves
    Info,
    /// Warning level - for collaborator failures that may clear up
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented and handled.
pub trait ErrorMetadata {
    /// Process exit code for command-line callers (sysexits conventions)
    fn exit_code(&self) -> i32;

    /// Machine-readable error code (e.g., "PRECONDITION_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later can succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the operator
    fn suggested_action(&self) -> Option<&'static str>;

    /// Operator-facing message
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Lifecycle gate that rejected an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "gate")]
pub enum Precondition {
    NoDocuments,
    NoRecipients,
    RecipientWithoutDocuments { reference: String },
    ValidationIncomplete { pending: usize },
    UnresolvedExceptions { count: usize },
    ValidationInProgress,
    ApprovalRequired,
    ApprovalDenied { reason: Option<String> },
    DispatchPlanRequired,
    JobLocked { stage: JobStage },
    TerminalStage,
    AtFirstStage,
    DocumentInUse { document_id: Uuid, recipients: usize },
}

impl Display for Precondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Precondition::NoDocuments => write!(f, "no documents uploaded"),
            Precondition::NoRecipients => write!(f, "no recipients mapped"),
            Precondition::RecipientWithoutDocuments { reference } => {
                write!(f, "recipient {} has no assigned documents", reference)
            }
            Precondition::ValidationIncomplete { pending } => {
                write!(f, "{} recipient address(es) not yet validated", pending)
            }
            Precondition::UnresolvedExceptions { count } => {
                write!(f, "{} unresolved address exception(s)", count)
            }
            Precondition::ValidationInProgress => write!(f, "address validation in progress"),
            Precondition::ApprovalRequired => write!(f, "approval required"),
            Precondition::ApprovalDenied { reason: Some(reason) } => {
                write!(f, "approval denied: {}", reason)
            }
            Precondition::ApprovalDenied { reason: None } => write!(f, "approval denied"),
            Precondition::DispatchPlanRequired => write!(f, "dispatch carrier and timing required"),
            Precondition::JobLocked { stage } => {
                write!(f, "job is locked for editing in stage {}", stage)
            }
            Precondition::TerminalStage => write!(f, "job has been dispatched"),
            Precondition::AtFirstStage => write!(f, "job is already at the first stage"),
            Precondition::DocumentInUse {
                document_id,
                recipients,
            } => write!(
                f,
                "document {} is assigned to {} recipient(s)",
                document_id, recipients
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("Address exception for recipient {recipient_id}: {reason}")]
    ValidationException {
        recipient_id: Uuid,
        reason: String,
        suggested_fix: Option<String>,
    },

    #[error("Import format error on line {line}: {message}")]
    ImportFormat { line: usize, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn precondition(&self) -> Option<&Precondition> {
        match self {
            AppError::PreconditionFailed(p) => Some(p),
            _ => None,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl From<Precondition> for AppError {
    fn from(p: Precondition) -> Self {
        AppError::PreconditionFailed(p)
    }
}

impl From<AddressException> for AppError {
    fn from(e: AddressException) -> Self {
        AppError::ValidationException {
            recipient_id: e.recipient_id,
            reason: e.reason,
            suggested_fix: e.suggested_fix,
        }
    }
}

impl From<ImportRowError> for AppError {
    fn from(e: ImportRowError) -> Self {
        AppError::ImportFormat {
            line: e.line,
            message: e.message,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (exit_code, error_code, recoverable, suggested_action, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (i32, &'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        AppError::NotFound { .. } => (
            66,
            "NOT_FOUND",
            false,
            Some("Verify the identifier exists"),
            LogLevel::Debug,
        ),
        AppError::PreconditionFailed(_) => (
            65,
            "PRECONDITION_FAILED",
            false,
            Some("Complete the current stage before advancing"),
            LogLevel::Debug,
        ),
        AppError::ValidationException { .. } => (
            65,
            "ADDRESS_EXCEPTION",
            false,
            Some("Fix the address or skip the exception"),
            LogLevel::Info,
        ),
        AppError::ImportFormat { .. } => (
            65,
            "IMPORT_FORMAT_ERROR",
            false,
            Some("Correct the row and import it again"),
            LogLevel::Info,
        ),
        AppError::InvalidInput(_) => (
            64,
            "INVALID_INPUT",
            false,
            Some("Check the input values and try again"),
            LogLevel::Debug,
        ),
        AppError::Cancelled(_) => (
            75,
            "CANCELLED",
            true,
            Some("Start the operation again"),
            LogLevel::Info,
        ),
        AppError::Provider(_) => (
            69,
            "PROVIDER_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Warn,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            70,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn exit_code(&self) -> i32 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal error".to_string()
            }
            AppError::PreconditionFailed(p) => format!("Cannot continue: {}", p),
            other => other.to_string(),
        }
    }
}
