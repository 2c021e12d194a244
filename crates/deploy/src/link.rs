//! Cross-chain link reconciliation.
//!
//! Links are configured with a single, all-or-nothing `initialize` call on the
//! source chain's routing-gateway. The record is only updated once that call is
//! confirmed, and a chain whose links are already recorded is never touched
//! again.

use alloy_core::{
    primitives::{Address, U256},
    sol_types::SolCall,
};
use anyhow::{Context, Result};

use crate::{
    chain::ChainClient,
    contracts::{GatewayRoute, IRoutingGateway},
    deployer::ModuleDeployer,
    record::{GatewayLink, ModuleKind},
    store::RecordStore,
};

/// A remote chain to register on the source gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub chain_id: u64,
    pub chain_label: String,
    pub gateway_address: Address,
}

impl From<&LinkTarget> for GatewayLink {
    fn from(target: &LinkTarget) -> Self {
        Self {
            target_chain_id: target.chain_id,
            target_gateway_address: target.gateway_address,
        }
    }
}

impl From<&LinkTarget> for GatewayRoute {
    fn from(target: &LinkTarget) -> Self {
        Self {
            chainId: U256::from(target.chain_id),
            chainName: target.chain_label.clone(),
            gatewayAddress: target.gateway_address,
        }
    }
}

/// What reconciling a chain amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Links were already configured; nothing was sent.
    AlreadyLinked(Vec<GatewayLink>),
    /// No other chain has a gateway yet; nothing was sent.
    NoTargets,
    /// The gateway was initialized with these links.
    Linked(Vec<GatewayLink>),
}

/// The links a chain still needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPlan {
    AlreadyLinked(Vec<GatewayLink>),
    Initialize {
        gateway: Address,
        targets: Vec<LinkTarget>,
    },
}

/// Reconciles the links of chains against one record store.
pub struct LinkReconciler<'a> {
    store: &'a RecordStore,
    deployer: ModuleDeployer,
}

impl<'a> LinkReconciler<'a> {
    pub fn new(store: &'a RecordStore, deployer: ModuleDeployer) -> Self {
        Self { store, deployer }
    }

    /// Compute the links `source_chain_id` needs from the persisted records.
    pub fn plan(&self, source_chain_id: u64) -> Result<LinkPlan> {
        let source = self
            .store
            .load(source_chain_id)?
            .with_context(|| format!("Chain {} has no deployment record", source_chain_id))?;

        if !source.links.is_empty() {
            return Ok(LinkPlan::AlreadyLinked(source.links));
        }

        let gateway = source.module(ModuleKind::RoutingGateway).with_context(|| {
            format!("Chain {} has no routing-gateway address", source_chain_id)
        })?;

        let mut targets = Vec::new();
        for record in self.store.list()? {
            if record.chain_id == source_chain_id {
                continue;
            }

            match record.module(ModuleKind::RoutingGateway) {
                Some(gateway_address) => targets.push(LinkTarget {
                    chain_id: record.chain_id,
                    chain_label: record.chain_label,
                    gateway_address,
                }),
                None => tracing::warn!(
                    source_chain_id,
                    target_chain_id = record.chain_id,
                    "Skipping chain without a routing-gateway"
                ),
            }
        }

        Ok(LinkPlan::Initialize { gateway, targets })
    }

    /// Register every other known chain on the source chain's gateway, once.
    ///
    /// Errors are returned without touching the record, so a failed run can be
    /// retried from scratch.
    pub async fn reconcile<C: ChainClient>(
        &self,
        client: &C,
        source_chain_id: u64,
    ) -> Result<LinkOutcome> {
        let (gateway, targets) = match self.plan(source_chain_id)? {
            LinkPlan::AlreadyLinked(links) => {
                tracing::info!(
                    chain_id = source_chain_id,
                    links = links.len(),
                    "Links already configured, nothing to do"
                );
                return Ok(LinkOutcome::AlreadyLinked(links));
            }
            LinkPlan::Initialize { gateway, targets } => (gateway, targets),
        };

        if targets.is_empty() {
            tracing::warn!(
                chain_id = source_chain_id,
                "No other chain has a routing-gateway, leaving links unconfigured"
            );
            return Ok(LinkOutcome::NoTargets);
        }

        tracing::info!(
            chain_id = source_chain_id,
            network = client.network(),
            %gateway,
            targets = targets.len(),
            "Configuring cross-chain routes..."
        );

        let calldata = IRoutingGateway::initializeCall {
            routes: targets.iter().map(GatewayRoute::from).collect(),
        }
        .abi_encode();

        self.deployer
            .transact(client, gateway, calldata.into())
            .await
            .with_context(|| format!("Failed to initialize the gateway of chain {}", source_chain_id))?;

        let links: Vec<GatewayLink> = targets.iter().map(GatewayLink::from).collect();

        // Re-read so the update applies to the latest persisted state.
        let mut record = self
            .store
            .load(source_chain_id)?
            .with_context(|| format!("Chain {} has no deployment record", source_chain_id))?;
        record.set_links(links.clone())?;
        self.store.save(&record)?;

        tracing::info!(chain_id = source_chain_id, links = links.len(), "Successfully configured routes");
        Ok(LinkOutcome::Linked(links))
    }
}
