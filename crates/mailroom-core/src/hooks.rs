//! Hooks for external collaborators that gate the lifecycle
//!
//! The core never talks to an approval system directly. The worker asks an
//! [`ApprovalAuthority`] for a decision and feeds it into the job's approve
//! command.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::JobSummary;

/// What the approval authority is asked to sign off on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub job_id: Uuid,
    pub job_name: String,
    pub jurisdiction_code: String,
    pub summary: JobSummary,
    /// Exceptions that were accepted without correction.
    pub overrides: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub approver: String,
    pub comment: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(approver: impl Into<String>) -> Self {
        Self {
            approved: true,
            approver: approver.into(),
            comment: None,
        }
    }

    pub fn reject(approver: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            approved: false,
            approver: approver.into(),
            comment: Some(comment.into()),
        }
    }
}

/// Approval gate consulted before a job may move to Approved.
#[async_trait]
pub trait ApprovalAuthority: Send + Sync {
    async fn review(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, String>;
}

/// Approves every request. Used when no approval system is configured.
pub struct AutoApprove {
    approver: String,
}

impl AutoApprove {
    pub fn new(approver: impl Into<String>) -> Self {
        Self {
            approver: approver.into(),
        }
    }
}

impl Default for AutoApprove {
    fn default() -> Self {
        Self::new("auto-approval")
    }
}

#[async_trait]
impl ApprovalAuthority for AutoApprove {
    async fn review(&self, _request: &ApprovalRequest) -> Result<ApprovalDecision, String> {
        Ok(ApprovalDecision::approve(self.approver.clone()))
    }
}
