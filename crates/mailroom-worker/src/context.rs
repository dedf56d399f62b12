//! Collaborators shared by every job
//!
//! The registry holds one [`WorkerContext`] and hands its services to job
//! commands. Tests and the CLI swap individual collaborators (a seeded
//! carrier, a slow address provider) by building the struct directly.

use std::sync::Arc;

use mailroom_core::{ApprovalAuthority, AppError, AppResult, AutoApprove, Config};
use mailroom_services::{
    create_storage, AddressValidator, DispatchLedger, DocumentIntake, RecipientDirectory,
    RecipientImporter, RuleBasedProvider, SimulatedCarrier, SimulatedCarrierConfig,
};

pub struct WorkerContext {
    pub directory: Arc<RecipientDirectory>,
    pub intake: Arc<DocumentIntake>,
    pub validator: Arc<AddressValidator>,
    pub ledger: Arc<DispatchLedger>,
    pub approval: Arc<dyn ApprovalAuthority>,
    pub importer: RecipientImporter,
}

impl WorkerContext {
    /// Default collaborators for `config`: the configured document storage,
    /// the rule-based address provider, the simulated carrier and automatic
    /// approval.
    pub async fn from_config(config: &Config, directory: RecipientDirectory) -> AppResult<Self> {
        let storage = create_storage(config)
            .await
            .map_err(|e| AppError::InvalidInput(format!("Storage configuration: {}", e)))?;

        let validator = AddressValidator::new(Arc::new(RuleBasedProvider::new()))
            .with_step_delay(config.validation_step_delay());
        let carrier = SimulatedCarrier::new(SimulatedCarrierConfig::from(config));

        tracing::info!(
            environment = %config.environment,
            storage = %config.storage_backend,
            address_provider = validator.provider_name(),
            carrier = "simulated",
            "Worker context initialized"
        );

        Ok(Self {
            directory: Arc::new(directory),
            intake: Arc::new(DocumentIntake::from_config(config, storage)),
            validator: Arc::new(validator),
            ledger: Arc::new(DispatchLedger::new(Arc::new(carrier))),
            approval: Arc::new(AutoApprove::default()),
            importer: RecipientImporter::new(config.default_delivery_type),
        })
    }
}
