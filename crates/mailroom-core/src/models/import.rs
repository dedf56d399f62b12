use serde::{Deserialize, Serialize};

use super::recipient::NewRecipient;

/// Column headers of the recipient import template.
pub const RECIPIENT_IMPORT_COLUMNS: [&str; 9] = [
    "Name",
    "Address",
    "City",
    "State",
    "ZIP",
    "Email",
    "Phone",
    "JurisdictionCode",
    "DeliveryType",
];

/// Raw row of a recipient import file, as laid out in the template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientImportRow {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Address", default)]
    pub address: String,
    #[serde(rename = "City", default)]
    pub city: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "ZIP", default)]
    pub zip: String,
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "Phone", default)]
    pub phone: Option<String>,
    #[serde(rename = "JurisdictionCode", default)]
    pub jurisdiction_code: Option<String>,
    #[serde(rename = "DeliveryType", default)]
    pub delivery_type: Option<String>,
}

/// A row that passed import checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedRecipient {
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub recipient: NewRecipient,
    pub phone: Option<String>,
    pub jurisdiction_code: Option<String>,
}

/// A row that was rejected; other rows are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub accepted: Vec<ImportedRecipient>,
    pub rejected: Vec<ImportRowError>,
}

impl ImportReport {
    pub fn total_rows(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}
