use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of verifying one mailing address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    Valid,
    AutoCorrected {
        corrected_address: String,
    },
    Exception {
        reason: String,
        suggested_fix: Option<String>,
    },
}

impl Verdict {
    pub fn exception(reason: impl Into<String>, suggested_fix: Option<String>) -> Self {
        Verdict::Exception {
            reason: reason.into(),
            suggested_fix,
        }
    }
}

/// Verdict for a specific recipient of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub recipient_id: Uuid,
    pub verdict: Verdict,
}

/// Open address exception, listed for manual resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressException {
    pub recipient_id: Uuid,
    pub reference: String,
    pub recipient_name: String,
    pub address: String,
    pub reason: String,
    pub suggested_fix: Option<String>,
}
