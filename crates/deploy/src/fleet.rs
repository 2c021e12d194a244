//! Fleet runner: provisions then links every configured chain of a namespace.

use std::{future::Future, time::Duration};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::{
    artifacts::ModuleArtifacts,
    chain::ChainClient,
    config::{ChainEntry, NexusConfig},
    link::{LinkOutcome, LinkReconciler},
    provision::{ChainProvisioner, ProvisionReport},
    record::ModuleKind,
    rpc::RpcChainClient,
    store::{Network, RecordStore},
};

/// Opens a [`ChainClient`] for a configured chain.
pub trait ChainConnector: Send + Sync {
    type Client: ChainClient;

    fn connect(&self, chain: &ChainEntry) -> impl Future<Output = Result<Self::Client>> + Send;
}

/// Connects over JSON-RPC to the endpoint configured for each chain.
#[derive(Debug, Clone, Copy)]
pub struct RpcConnector {
    pub poll_interval: Duration,
}

impl ChainConnector for RpcConnector {
    type Client = RpcChainClient;

    async fn connect(&self, chain: &ChainEntry) -> Result<RpcChainClient> {
        RpcChainClient::connect(&chain.network, chain.rpc_url.clone(), self.poll_interval).await
    }
}

/// Provisioning result of one chain in a fleet run.
#[derive(Debug)]
pub enum ChainProvisioning {
    /// The orchestrator ran, completely or up to a failing step.
    Ran(ProvisionReport),
    /// No connection could be opened; nothing was attempted.
    Unreachable(anyhow::Error),
}

impl ChainProvisioning {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Ran(report) if report.is_complete())
    }

    /// The routing-gateway recorded by the run, if it got that far.
    pub fn routing_gateway(&self) -> Option<Address> {
        match self {
            Self::Ran(report) => report.record.module(ModuleKind::RoutingGateway),
            Self::Unreachable(_) => None,
        }
    }
}

/// Outcome of a full fleet run.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub provisioned: Vec<(u64, ChainProvisioning)>,
    pub linked: Vec<(u64, LinkOutcome)>,
}

impl FleetReport {
    pub fn is_complete(&self) -> bool {
        self.provisioned.iter().all(|(_, run)| run.is_complete())
    }
}

/// Drives the orchestrator and the reconciler over the chains of a namespace.
pub struct FleetRunner<'a, K: ChainConnector> {
    config: &'a NexusConfig,
    network: Network,
    store: &'a RecordStore,
    artifacts: &'a ModuleArtifacts,
    connector: K,
}

impl<'a, K: ChainConnector> FleetRunner<'a, K> {
    pub fn new(
        config: &'a NexusConfig,
        store: &'a RecordStore,
        artifacts: &'a ModuleArtifacts,
        connector: K,
    ) -> Self {
        Self {
            config,
            network: store.network(),
            store,
            artifacts,
            connector,
        }
    }

    /// Provision every chain, then link every chain.
    ///
    /// Linking waits for the first pass to finish since a chain can only be
    /// registered once its gateway address is in the store. Provisioning
    /// failures are reported and the run moves on to the next chain, but the
    /// link pass only starts once every chain has a routing-gateway: links are
    /// configured once, so a chain missing at that point would never be added.
    /// Linking failures abort the run.
    pub async fn run(&self) -> Result<FleetReport> {
        let chains = self.config.chains(self.network);
        tracing::info!(network = %self.network, chains = chains.len(), "Deploying fleet...");

        let mut report = FleetReport::default();

        for chain in chains {
            let provisioning = match self.connector.connect(chain).await {
                Ok(client) => ChainProvisioning::Ran(self.provision_with(&client, chain).await?),
                Err(error) => {
                    tracing::error!(
                        chain_id = chain.chain_id,
                        network = %chain.network,
                        error = ?error,
                        "Failed to connect, skipping chain"
                    );
                    ChainProvisioning::Unreachable(error)
                }
            };
            report.provisioned.push((chain.chain_id, provisioning));
        }

        let without_gateway: Vec<u64> = report
            .provisioned
            .iter()
            .filter(|(_, provisioning)| provisioning.routing_gateway().is_none())
            .map(|(chain_id, _)| *chain_id)
            .collect();
        if !without_gateway.is_empty() {
            tracing::error!(
                network = %self.network,
                chains = ?without_gateway,
                "Chains have no routing-gateway, not linking the fleet"
            );
            anyhow::bail!(
                "Chains {:?} have no routing-gateway yet, fleet left unlinked. Run again to resume.",
                without_gateway
            );
        }

        tracing::info!(network = %self.network, "Deploying completed, linking...");

        for chain in chains {
            let client = self
                .connector
                .connect(chain)
                .await
                .with_context(|| format!("Failed to connect to {}", chain.network))?;
            let outcome = self.link_with(&client, chain.chain_id).await?;
            report.linked.push((chain.chain_id, outcome));
        }

        tracing::info!(network = %self.network, "Fleet linked");
        Ok(report)
    }

    /// Provision a single configured chain.
    pub async fn provision_chain(&self, chain_id: u64) -> Result<ProvisionReport> {
        let chain = self.config.chain(self.network, chain_id)?;
        let client = self
            .connector
            .connect(chain)
            .await
            .with_context(|| format!("Failed to connect to {}", chain.network))?;
        self.provision_with(&client, chain).await
    }

    async fn provision_with(&self, client: &K::Client, chain: &ChainEntry) -> Result<ProvisionReport> {
        ChainProvisioner::new(self.store, self.artifacts, self.config.module_deployer())
            .provision(client, chain.chain_id, &chain.parameters)
            .await
    }

    async fn link_with(&self, client: &K::Client, chain_id: u64) -> Result<LinkOutcome> {
        LinkReconciler::new(self.store, self.config.module_deployer())
            .reconcile(client, chain_id)
            .await
    }
}

/// Reconcile the links of a single configured chain.
///
/// Linking reads the store only, so no build artifacts are needed.
pub async fn link_chain<K: ChainConnector>(
    config: &NexusConfig,
    store: &RecordStore,
    connector: &K,
    chain_id: u64,
) -> Result<LinkOutcome> {
    let chain = config.chain(store.network(), chain_id)?;
    let client = connector
        .connect(chain)
        .await
        .with_context(|| format!("Failed to connect to {}", chain.network))?;
    LinkReconciler::new(store, config.module_deployer())
        .reconcile(&client, chain_id)
        .await
}
