//! Module deployment through the per-chain deterministic deployer contract.
//!
//! The deployer contract plays the role of an arena and the bytecode hash the
//! role of an index: the address of a module is a pure function of the two, so it
//! can be recomputed at any time without asking the chain.

use alloy_core::{
    primitives::{Address, B256, Bytes},
    sol_types::SolCall,
};
use anyhow::{Context, Result};

use crate::{
    artifacts::ModuleArtifact,
    chain::{ChainClient, Confirmations, Receipt},
    contracts::IDeployer,
};

/// Address of the module whose bytecode hashes to `bytecode_hash`, once deployed
/// through `factory`.
pub fn deterministic_address(factory: Address, bytecode_hash: B256) -> Address {
    factory.create2(B256::ZERO, bytecode_hash)
}

/// Submits deployments and transactions, waiting for the configured depth.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDeployer {
    /// Depth required for module deployments and calls.
    pub confirmations: Confirmations,
    /// Depth required for the deployer contract itself. Every module address
    /// derives from it, so it must be final before anything else is deployed.
    pub deployer_confirmations: Confirmations,
}

impl ModuleDeployer {
    pub fn new(confirmations: Confirmations, deployer_confirmations: Confirmations) -> Self {
        Self {
            confirmations,
            deployer_confirmations,
        }
    }

    /// Create the per-chain deployer contract and return its address.
    pub async fn create_deployer<C: ChainClient>(
        &self,
        client: &C,
        artifact: &ModuleArtifact,
    ) -> Result<Address> {
        tracing::info!(network = client.network(), artifact = %artifact.name, "Creating deployer contract...");

        let tx_hash = client
            .deploy_contract(artifact.bytecode.clone())
            .await
            .with_context(|| format!("Failed to submit {} creation", artifact.name))?;

        let receipt = client
            .wait_for_confirmations(tx_hash, self.deployer_confirmations)
            .await
            .with_context(|| format!("Failed to confirm {} creation", artifact.name))?;

        let address = receipt.contract_address.with_context(|| {
            format!(
                "Receipt of {} creation ({}) has no contract address",
                artifact.name, tx_hash
            )
        })?;

        tracing::info!(%address, %tx_hash, block = receipt.block_number, "Deployer contract created");
        Ok(address)
    }

    /// Deploy a module through `factory` and return its deterministic address.
    ///
    /// The address is only returned once the deployment is confirmed; a timeout
    /// or a revert is returned as an error and nothing should be recorded.
    pub async fn deploy<C: ChainClient>(
        &self,
        client: &C,
        factory: Address,
        artifact: &ModuleArtifact,
        args: Bytes,
    ) -> Result<Address> {
        let calldata = IDeployer::deployContractCall {
            bytecode: artifact.bytecode.clone(),
            args,
        }
        .abi_encode();

        let receipt = self
            .transact(client, factory, calldata.into())
            .await
            .with_context(|| format!("Failed to deploy {}", artifact.name))?;

        let address = deterministic_address(factory, artifact.bytecode_hash());
        tracing::debug!(
            module = %artifact.name,
            %address,
            tx_hash = %receipt.tx_hash,
            "Module deployed"
        );

        Ok(address)
    }

    /// Send a transaction and wait for the module confirmation depth.
    pub async fn transact<C: ChainClient>(
        &self,
        client: &C,
        to: Address,
        calldata: Bytes,
    ) -> Result<Receipt> {
        let tx_hash = client.send_transaction(to, calldata).await?;
        tracing::debug!(%tx_hash, %to, "Transaction submitted");

        client
            .wait_for_confirmations(tx_hash, self.confirmations)
            .await
    }
}
