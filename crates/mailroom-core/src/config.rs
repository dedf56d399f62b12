//! Configuration module
//!
//! Settings for document intake, storage, the simulated collaborators and the
//! carrier status poller, read from the process environment.

use std::env;

use crate::models::DeliveryType;
use crate::storage_types::StorageBackend;

const MAX_DOCUMENT_SIZE_MB: u64 = 50;
const CARRIER_POLL_INTERVAL_SECS: u64 = 60;
const CARRIER_DELIVERY_PROBABILITY: f64 = 0.5;
const CARRIER_EXCEPTION_PROBABILITY: f64 = 0.05;
const DOCUMENT_ALLOWED_EXTENSIONS: &str = "pdf,doc,docx";

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    // Address validation
    pub validation_step_delay_ms: u64,
    // Carrier
    pub carrier_poll_interval_secs: u64,
    pub carrier_delivery_probability: f64,
    pub carrier_exception_probability: f64,
    // Documents
    pub max_document_size_bytes: u64,
    pub document_allowed_extensions: Vec<String>,
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Import
    pub default_delivery_type: DeliveryType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            validation_step_delay_ms: 0,
            carrier_poll_interval_secs: CARRIER_POLL_INTERVAL_SECS,
            carrier_delivery_probability: CARRIER_DELIVERY_PROBABILITY,
            carrier_exception_probability: CARRIER_EXCEPTION_PROBABILITY,
            max_document_size_bytes: MAX_DOCUMENT_SIZE_MB * 1024 * 1024,
            document_allowed_extensions: split_list(DOCUMENT_ALLOWED_EXTENSIONS),
            storage_backend: StorageBackend::Memory,
            local_storage_path: None,
            local_storage_base_url: None,
            default_delivery_type: DeliveryType::CertifiedMail,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn megabytes_to_bytes(megabytes: u64) -> Result<u64, anyhow::Error> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("MAX_DOCUMENT_SIZE_MB is too large: {}", megabytes))
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let max_document_size_mb: u64 = env::var("MAX_DOCUMENT_SIZE_MB")
            .unwrap_or_else(|_| MAX_DOCUMENT_SIZE_MB.to_string())
            .parse()
            .unwrap_or(MAX_DOCUMENT_SIZE_MB);

        let local_storage_path = env::var("LOCAL_STORAGE_PATH").ok();

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) if local_storage_path.is_some() => StorageBackend::Local,
            Err(_) => StorageBackend::Memory,
        };

        let local_storage_base_url = env::var("LOCAL_STORAGE_BASE_URL")
            .ok()
            .or_else(|| local_storage_path.as_ref().map(|p| format!("file://{}", p)));

        let default_delivery_type = match env::var("DEFAULT_DELIVERY_TYPE") {
            Ok(value) => value.parse()?,
            Err(_) => DeliveryType::CertifiedMail,
        };

        let config = Config {
            environment,
            validation_step_delay_ms: env::var("VALIDATION_STEP_DELAY_MS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            carrier_poll_interval_secs: env::var("CARRIER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| CARRIER_POLL_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(CARRIER_POLL_INTERVAL_SECS),
            carrier_delivery_probability: env::var("CARRIER_DELIVERY_PROBABILITY")
                .unwrap_or_else(|_| CARRIER_DELIVERY_PROBABILITY.to_string())
                .parse()
                .unwrap_or(CARRIER_DELIVERY_PROBABILITY),
            carrier_exception_probability: env::var("CARRIER_EXCEPTION_PROBABILITY")
                .unwrap_or_else(|_| CARRIER_EXCEPTION_PROBABILITY.to_string())
                .parse()
                .unwrap_or(CARRIER_EXCEPTION_PROBABILITY),
            max_document_size_bytes: megabytes_to_bytes(max_document_size_mb)?,
            document_allowed_extensions: split_list(
                &env::var("DOCUMENT_ALLOWED_EXTENSIONS")
                    .unwrap_or_else(|_| DOCUMENT_ALLOWED_EXTENSIONS.to_string()),
            ),
            storage_backend,
            local_storage_path,
            local_storage_base_url,
            default_delivery_type,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for (name, p) in [
            ("CARRIER_DELIVERY_PROBABILITY", self.carrier_delivery_probability),
            ("CARRIER_EXCEPTION_PROBABILITY", self.carrier_exception_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("{} must be between 0 and 1, got {}", name, p);
            }
        }
        if self.carrier_delivery_probability + self.carrier_exception_probability > 1.0 {
            anyhow::bail!(
                "CARRIER_DELIVERY_PROBABILITY + CARRIER_EXCEPTION_PROBABILITY must not exceed 1"
            );
        }
        if self.max_document_size_bytes == 0 {
            anyhow::bail!("MAX_DOCUMENT_SIZE_MB must be greater than 0");
        }
        if self.document_allowed_extensions.is_empty() {
            anyhow::bail!("DOCUMENT_ALLOWED_EXTENSIONS must list at least one extension");
        }
        if self.storage_backend == StorageBackend::Local && self.local_storage_path.is_none() {
            anyhow::bail!("LOCAL_STORAGE_PATH is required when STORAGE_BACKEND=local");
        }
        Ok(())
    }

    pub fn validation_step_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.validation_step_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.document_allowed_extensions, vec!["pdf", "doc", "docx"]);
    }

    #[test]
    fn test_probabilities_must_fit() {
        let config = Config {
            carrier_delivery_probability: 0.8,
            carrier_exception_probability: 0.3,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            carrier_exception_probability: -0.1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_backend_requires_path() {
        let config = Config {
            storage_backend: StorageBackend::Local,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_list_normalizes() {
        assert_eq!(split_list(" .PDF, docx ,,"), vec!["pdf", "docx"]);
    }

    #[test]
    fn test_document_size_overflow_rejected() {
        assert_eq!(megabytes_to_bytes(50).unwrap(), 50 * 1024 * 1024);
        let err = megabytes_to_bytes(u64::MAX / 1024).unwrap_err();
        assert!(err.to_string().contains("MAX_DOCUMENT_SIZE_MB is too large"));
    }
}
