//! Validation modules

pub mod fields;

pub use fields::{
    compose_address, is_valid_state_code, is_valid_zip, validate_job_details,
    validate_jurisdiction_code, validate_new_recipient, MAX_ADDRESS_LENGTH,
};
