//! Chain deployment orchestrator.
//!
//! Brings one chain to its fully provisioned state. Every step is gated on the
//! record field it produces, mutates only that field, and persists the record
//! right away. A failing step stops the run but never rolls anything back, so
//! the next invocation resumes at the first unsatisfied step.

use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use anyhow::{Context, Result};
use strum::IntoEnumIterator;

use crate::{
    artifacts::ModuleArtifacts,
    chain::{ChainClient, ChainError},
    config::ChainParameters,
    contracts::{self, IModuleCatalog, IVaultController},
    deployer::ModuleDeployer,
    record::{ChainDeploymentRecord, ModuleKind, ModuleListing},
    store::RecordStore,
};

/// The ordered provisioning steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ProvisionStep {
    Deployer,
    LoupeModule,
    Factory,
    ModuleCatalog,
    VaultController,
    RoutingGateway,
    GatewayLink,
    ModuleListings,
}

impl ProvisionStep {
    /// Whether the record already holds everything this step produces.
    pub fn is_satisfied(&self, record: &ChainDeploymentRecord) -> bool {
        let modules = &record.module_addresses;
        match self {
            Self::Deployer => record.deployer_address.is_some(),
            Self::LoupeModule => modules.loupe_module.is_some(),
            Self::Factory => modules.factory.is_some(),
            Self::ModuleCatalog => modules.module_catalog.is_some(),
            Self::VaultController => {
                modules.vault_controller.is_some() && modules.vault_module.is_some()
            }
            Self::RoutingGateway => modules.routing_gateway.is_some(),
            Self::GatewayLink => record.gateway_linked,
            Self::ModuleListings => [modules.loupe_module, modules.vault_module]
                .into_iter()
                .all(|module| module.is_some_and(|address| record.is_listed(address))),
        }
    }
}

/// The step a run stopped at.
#[derive(Debug)]
pub struct StepFailure {
    pub step: ProvisionStep,
    pub error: anyhow::Error,
}

impl StepFailure {
    /// A reverted transaction needs operator attention before a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        !ChainError::is_revert(&self.error)
    }
}

/// Result of one provisioning run.
#[derive(Debug)]
pub struct ProvisionReport {
    /// The record as persisted at the end of the run.
    pub record: ChainDeploymentRecord,
    /// Steps that issued on-chain work during this run.
    pub executed: Vec<ProvisionStep>,
    pub failure: Option<StepFailure>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Provisions chains against one record store.
pub struct ChainProvisioner<'a> {
    store: &'a RecordStore,
    artifacts: &'a ModuleArtifacts,
    deployer: ModuleDeployer,
}

impl<'a> ChainProvisioner<'a> {
    pub fn new(store: &'a RecordStore, artifacts: &'a ModuleArtifacts, deployer: ModuleDeployer) -> Self {
        Self {
            store,
            artifacts,
            deployer,
        }
    }

    /// Run every unsatisfied step for `chain_id`.
    ///
    /// Step failures are logged and reported in the returned report after the
    /// partial progress has been persisted. Only failures to read or write the
    /// record itself are returned as errors.
    pub async fn provision<C: ChainClient>(
        &self,
        client: &C,
        chain_id: u64,
        params: &ChainParameters,
    ) -> Result<ProvisionReport> {
        let mut record = self.store.load_or_create(chain_id, &params.chain_label)?;
        self.store.save(&record)?;

        tracing::info!(
            chain_id,
            chain_label = %record.chain_label,
            network = client.network(),
            signer = %client.signer(),
            "Provisioning chain..."
        );

        let mut executed = Vec::new();
        let mut failure = None;

        for step in ProvisionStep::iter() {
            if step.is_satisfied(&record) {
                tracing::debug!(chain_id, %step, "Step already satisfied, skipping");
                continue;
            }

            tracing::info!(chain_id, %step, "Running step...");
            match self.run_step(step, client, params, &mut record).await {
                Ok(()) => executed.push(step),
                Err(error) => {
                    tracing::error!(chain_id, %step, error = ?error, "Provisioning step failed");
                    failure = Some(StepFailure { step, error });
                    break;
                }
            }
        }

        self.store
            .save(&record)
            .with_context(|| format!("Failed to persist progress of chain {}", chain_id))?;

        if failure.is_none() {
            tracing::info!(chain_id, steps = executed.len(), "Chain fully provisioned");
        }

        Ok(ProvisionReport {
            record,
            executed,
            failure,
        })
    }

    async fn run_step<C: ChainClient>(
        &self,
        step: ProvisionStep,
        client: &C,
        params: &ChainParameters,
        record: &mut ChainDeploymentRecord,
    ) -> Result<()> {
        let owner = client.signer();

        match step {
            ProvisionStep::Deployer => {
                let address = self
                    .deployer
                    .create_deployer(client, &self.artifacts.deployer)
                    .await?;
                record.record_deployer(address)?;
                self.store.save(record)?;
            }
            ProvisionStep::LoupeModule => {
                self.deploy_module(client, record, ModuleKind::LoupeModule, Bytes::new())
                    .await?;
            }
            ProvisionStep::Factory => {
                let args = contracts::factory_args(params.fee_token, params.creation_fee, owner);
                self.deploy_module(client, record, ModuleKind::Factory, args)
                    .await?;
            }
            ProvisionStep::ModuleCatalog => {
                let args = contracts::module_catalog_args(owner);
                self.deploy_module(client, record, ModuleKind::ModuleCatalog, args)
                    .await?;
            }
            ProvisionStep::VaultController => {
                if record.module_addresses.vault_controller.is_none() {
                    let catalog = required(record, ModuleKind::ModuleCatalog)?;
                    let args = contracts::vault_controller_args(record.chain_id, catalog, owner);
                    self.deploy_module(client, record, ModuleKind::VaultController, args)
                        .await?;
                }

                let controller = required(record, ModuleKind::VaultController)?;
                let vault_module = read_vault_module(client, controller).await?;
                record.record_module(ModuleKind::VaultModule, vault_module)?;
                self.store.save(record)?;
                tracing::info!(chain_id = record.chain_id, address = %vault_module, "Vault-module recorded");
            }
            ProvisionStep::RoutingGateway => {
                let controller = required(record, ModuleKind::VaultController)?;
                let args = contracts::routing_gateway_args(
                    record.chain_id,
                    controller,
                    params.messaging_gateway,
                    params.messaging_gas_service,
                    owner,
                );
                self.deploy_module(client, record, ModuleKind::RoutingGateway, args)
                    .await?;
            }
            ProvisionStep::GatewayLink => {
                let controller = required(record, ModuleKind::VaultController)?;
                let gateway = required(record, ModuleKind::RoutingGateway)?;
                let calldata = IVaultController::addApprovedGatewayCall { gateway }.abi_encode();

                self.deployer
                    .transact(client, controller, calldata.into())
                    .await
                    .context("Failed to approve the routing-gateway on the vault-controller")?;

                record.mark_gateway_linked()?;
                self.store.save(record)?;
                tracing::info!(chain_id = record.chain_id, %gateway, %controller, "Gateway linked");
            }
            ProvisionStep::ModuleListings => {
                let catalog = required(record, ModuleKind::ModuleCatalog)?;
                let offerings = [
                    (ModuleKind::LoupeModule, params.loupe_module_fee),
                    (ModuleKind::VaultModule, params.vault_module_fee),
                ];

                for (kind, fee_amount) in offerings {
                    let module = required(record, kind)?;
                    if record.is_listed(module) {
                        tracing::debug!(chain_id = record.chain_id, module = %kind, "Module already listed");
                        continue;
                    }

                    self.list_module(client, record, catalog, module, params.fee_token, fee_amount)
                        .await
                        .with_context(|| format!("Failed to list {} in the catalog", kind))?;
                }
            }
        }

        Ok(())
    }

    /// Deploy a module through the chain's deployer and persist its address.
    async fn deploy_module<C: ChainClient>(
        &self,
        client: &C,
        record: &mut ChainDeploymentRecord,
        kind: ModuleKind,
        args: Bytes,
    ) -> Result<()> {
        let factory = record
            .deployer_address
            .context("Deployer contract is not deployed yet")?;
        let artifact = self
            .artifacts
            .module(kind)
            .with_context(|| format!("{} is not deployed directly", kind))?;

        let address = self.deployer.deploy(client, factory, artifact, args).await?;

        record.record_module(kind, address)?;
        self.store.save(record)?;

        tracing::info!(chain_id = record.chain_id, module = %kind, %address, "Module deployed");
        Ok(())
    }

    async fn list_module<C: ChainClient>(
        &self,
        client: &C,
        record: &mut ChainDeploymentRecord,
        catalog: Address,
        module: Address,
        fee_token: Address,
        fee_amount: U256,
    ) -> Result<()> {
        let calldata = IModuleCatalog::addOfferingCall {
            facet: module,
            feeToken: fee_token,
            feeAmount: fee_amount,
        }
        .abi_encode();

        self.deployer
            .transact(client, catalog, calldata.into())
            .await?;

        record.add_listing(ModuleListing {
            module_address: module,
            fee_token,
            fee_amount,
        });
        self.store.save(record)?;

        tracing::info!(chain_id = record.chain_id, %module, %fee_amount, "Module listed in catalog");
        Ok(())
    }
}

fn required(record: &ChainDeploymentRecord, kind: ModuleKind) -> Result<Address> {
    record
        .module(kind)
        .with_context(|| format!("Chain {} has no {} yet", record.chain_id, kind))
}

/// The vault-module is created by its controller; read its address back.
async fn read_vault_module<C: ChainClient>(client: &C, controller: Address) -> Result<Address> {
    let output = client
        .call(controller, IVaultController::facetAddressCall {}.abi_encode().into())
        .await
        .context("Failed to read the vault-module address")?;

    let decoded = IVaultController::facetAddressCall::abi_decode_returns(&output, true)
        .context("Failed to decode the vault-module address")?;

    if decoded.facet == Address::ZERO {
        anyhow::bail!("Vault-controller {} reports no vault-module", controller);
    }
    Ok(decoded.facet)
}
