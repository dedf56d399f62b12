//! Recipient import
//!
//! Parses recipient rows laid out as in the import template. Every row is
//! checked on its own: a malformed row is reported with its line number and
//! the remaining rows are still accepted.

use mailroom_core::models::{
    DeliveryType, ImportReport, ImportRowError, ImportedRecipient, NewRecipient,
    RecipientImportRow, RECIPIENT_IMPORT_COLUMNS,
};
use mailroom_core::validation::{
    compose_address, is_valid_state_code, is_valid_zip, validate_jurisdiction_code,
    validate_new_recipient,
};
use mailroom_core::{AppError, AppResult};
use std::io::Read;

const REQUIRED_COLUMNS: [&str; 5] = ["Name", "Address", "City", "State", "ZIP"];

const SAMPLE_ROW: [&str; 9] = [
    "Jane Doe",
    "42 Oak Ave",
    "Springfield",
    "IL",
    "62704",
    "jane.doe@example.com",
    "555-0100",
    "IL",
    "certified_mail",
];

/// Import template: the header line followed by one sample row.
pub fn import_template() -> String {
    let mut template = RECIPIENT_IMPORT_COLUMNS.join(",");
    template.push('\n');
    template.push_str(&SAMPLE_ROW.join(","));
    template.push('\n');
    template
}

pub struct RecipientImporter {
    default_delivery_type: DeliveryType,
}

impl Default for RecipientImporter {
    fn default() -> Self {
        Self::new(DeliveryType::default())
    }
}

impl RecipientImporter {
    pub fn new(default_delivery_type: DeliveryType) -> Self {
        Self {
            default_delivery_type,
        }
    }

    pub fn parse_str(&self, input: &str) -> AppResult<ImportReport> {
        self.parse(input.as_bytes())
    }

    /// Parse an import file.
    ///
    /// Only a missing or unusable header fails the whole import, as an
    /// `ImportFormat` error on line 1. Row problems land in
    /// [`ImportReport::rejected`].
    #[tracing::instrument(skip_all)]
    pub fn parse<R: Read>(&self, input: R) -> AppResult<ImportReport> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| AppError::ImportFormat {
                line: 1,
                message: format!("unreadable header: {}", e),
            })?
            .clone();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !headers.iter().any(|h| h.eq_ignore_ascii_case(c)))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ImportFormat {
                line: 1,
                message: format!("missing column(s): {}", missing.join(", ")),
            });
        }
        let headers = canonical_headers(&headers);

        let mut report = ImportReport::default();
        for (index, record) in reader.records().enumerate() {
            // Header is line 1.
            let fallback_line = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(fallback_line);
                    report.rejected.push(ImportRowError {
                        line,
                        message: format!("unreadable row: {}", e),
                    });
                    continue;
                }
            };
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(fallback_line);
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }

            let parsed = record
                .deserialize::<RecipientImportRow>(Some(&headers))
                .map_err(|e| format!("unreadable row: {}", e))
                .and_then(|row| self.check_row(row));
            match parsed {
                Ok((recipient, phone, jurisdiction_code)) => report.accepted.push(ImportedRecipient {
                    line,
                    recipient,
                    phone,
                    jurisdiction_code,
                }),
                Err(message) => report.rejected.push(ImportRowError { line, message }),
            }
        }

        tracing::info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Recipient import parsed"
        );
        Ok(report)
    }

    fn check_row(
        &self,
        row: RecipientImportRow,
    ) -> Result<(NewRecipient, Option<String>, Option<String>), String> {
        let empty: Vec<&str> = [
            ("Name", &row.name),
            ("Address", &row.address),
            ("City", &row.city),
            ("State", &row.state),
            ("ZIP", &row.zip),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(column, _)| column)
        .collect();
        if !empty.is_empty() {
            return Err(format!("missing {}", empty.join(", ")));
        }
        if !is_valid_state_code(&row.state) {
            return Err(format!("invalid state code '{}'", row.state));
        }
        if !is_valid_zip(&row.zip) {
            return Err(format!("invalid ZIP code '{}'", row.zip));
        }

        let delivery_type = match non_empty(row.delivery_type) {
            Some(value) => value
                .parse::<DeliveryType>()
                .map_err(|_| format!("unknown delivery type '{}'", value))?,
            None => self.default_delivery_type,
        };
        let jurisdiction_code = non_empty(row.jurisdiction_code).map(|c| c.to_uppercase());
        if let Some(code) = &jurisdiction_code {
            validate_jurisdiction_code(code).map_err(|e| e.to_string())?;
        }

        let recipient = NewRecipient {
            name: row.name,
            organization_id: None,
            email: non_empty(row.email),
            address: compose_address(&row.address, &row.city, &row.state, &row.zip),
            document_ids: Vec::new(),
            delivery_type,
        };
        validate_new_recipient(&recipient).map_err(|e| match e {
            AppError::InvalidInput(message) => message,
            other => other.to_string(),
        })?;
        Ok((recipient, non_empty(row.phone), jurisdiction_code))
    }
}

/// Header record with known columns spelled as in the template, so lookups
/// by serde name ignore case.
fn canonical_headers(headers: &csv::StringRecord) -> csv::StringRecord {
    headers
        .iter()
        .map(|h| {
            RECIPIENT_IMPORT_COLUMNS
                .iter()
                .find(|c| c.eq_ignore_ascii_case(h))
                .copied()
                .unwrap_or(h)
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
