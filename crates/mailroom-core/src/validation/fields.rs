//! Field-level validation
//!
//! Job details and recipient input are checked here before they reach the
//! aggregate. Structural rules (required, length, e-mail syntax) come from the
//! `validator` derives on the models; format rules that need a pattern live
//! in this module.

use std::sync::LazyLock;

use regex::Regex;
use validator::Validate;

use crate::error::AppError;
use crate::models::{JobDetails, NewRecipient};

/// Maximum length of a single-line mailing address.
pub const MAX_ADDRESS_LENGTH: usize = 500;

static JURISDICTION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9\-]{1,15}$").expect("static regex"));

static ZIP_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("static regex"));

static STATE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2}$").expect("static regex"));

/// Jurisdiction codes are 2-16 uppercase letters, digits or dashes, e.g. `CA-SF` or `NY`.
pub fn validate_jurisdiction_code(code: &str) -> Result<(), AppError> {
    if !JURISDICTION_CODE.is_match(code) {
        return Err(AppError::InvalidInput(format!(
            "Jurisdiction code '{}' must be 2-16 uppercase letters, digits or dashes",
            code
        )));
    }
    Ok(())
}

pub fn validate_job_details(details: &JobDetails) -> Result<(), AppError> {
    details.validate()?;
    if details.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Job name is required".to_string()));
    }
    validate_jurisdiction_code(&details.jurisdiction_code)
}

pub fn validate_new_recipient(input: &NewRecipient) -> Result<(), AppError> {
    input.validate()?;
    if input.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Recipient name is required".to_string()));
    }
    if input.address.trim().is_empty() {
        return Err(AppError::InvalidInput("Mailing address is required".to_string()));
    }
    Ok(())
}

pub fn is_valid_zip(zip: &str) -> bool {
    ZIP_CODE.is_match(zip.trim())
}

pub fn is_valid_state_code(state: &str) -> bool {
    STATE_CODE.is_match(state.trim())
}

/// Compose a single-line address as `street, city, ST zip`.
pub fn compose_address(street: &str, city: &str, state: &str, zip: &str) -> String {
    format!(
        "{}, {}, {} {}",
        street.trim(),
        city.trim(),
        state.trim().to_uppercase(),
        zip.trim()
    )
}
