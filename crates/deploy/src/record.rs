//! Per-chain deployment record.
//!
//! A [`ChainDeploymentRecord`] is the permanent ledger of a chain's provisioning
//! state. Every field moves from "not provisioned" to a value exactly once and is
//! never reset, so the mutators below refuse any transition that would overwrite
//! an existing value with a different one.

use alloy_core::primitives::{Address, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The fixed set of modules provisioned on every chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ModuleKind {
    RoutingGateway,
    VaultController,
    VaultModule,
    ModuleCatalog,
    LoupeModule,
    Factory,
}

/// Addresses of the deployed modules, `None` meaning "not yet deployed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleAddresses {
    pub routing_gateway: Option<Address>,
    pub vault_controller: Option<Address>,
    pub vault_module: Option<Address>,
    pub module_catalog: Option<Address>,
    pub loupe_module: Option<Address>,
    pub factory: Option<Address>,
}

impl ModuleAddresses {
    /// Get the recorded address of a module.
    pub fn get(&self, kind: ModuleKind) -> Option<Address> {
        match kind {
            ModuleKind::RoutingGateway => self.routing_gateway,
            ModuleKind::VaultController => self.vault_controller,
            ModuleKind::VaultModule => self.vault_module,
            ModuleKind::ModuleCatalog => self.module_catalog,
            ModuleKind::LoupeModule => self.loupe_module,
            ModuleKind::Factory => self.factory,
        }
    }

    fn slot_mut(&mut self, kind: ModuleKind) -> &mut Option<Address> {
        match kind {
            ModuleKind::RoutingGateway => &mut self.routing_gateway,
            ModuleKind::VaultController => &mut self.vault_controller,
            ModuleKind::VaultModule => &mut self.vault_module,
            ModuleKind::ModuleCatalog => &mut self.module_catalog,
            ModuleKind::LoupeModule => &mut self.loupe_module,
            ModuleKind::Factory => &mut self.factory,
        }
    }

    /// Number of modules with a recorded address.
    pub fn deployed_count(&self) -> usize {
        use strum::IntoEnumIterator;

        ModuleKind::iter().filter(|kind| self.get(*kind).is_some()).count()
    }
}

/// A module registered in the module catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleListing {
    pub module_address: Address,
    pub fee_token: Address,
    pub fee_amount: U256,
}

/// A cross-chain route configured on this chain's routing-gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayLink {
    pub target_chain_id: u64,
    pub target_gateway_address: Address,
}

/// Durable record of everything provisioned on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDeploymentRecord {
    /// Protocol-level identifier of the chain.
    pub chain_id: u64,
    /// Name the messaging layer uses to address this chain.
    pub chain_label: String,
    /// The per-chain deterministic deployer contract.
    #[serde(default)]
    pub deployer_address: Option<Address>,
    #[serde(default)]
    pub module_addresses: ModuleAddresses,
    /// Whether the routing-gateway is an approved caller of the vault-controller.
    #[serde(default)]
    pub gateway_linked: bool,
    #[serde(default)]
    pub module_listings: Vec<ModuleListing>,
    #[serde(default)]
    pub links: Vec<GatewayLink>,
}

impl ChainDeploymentRecord {
    /// Create an empty record for a chain that has never been targeted.
    pub fn new(chain_id: u64, chain_label: impl Into<String>) -> Self {
        Self {
            chain_id,
            chain_label: chain_label.into(),
            deployer_address: None,
            module_addresses: ModuleAddresses::default(),
            gateway_linked: false,
            module_listings: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Shorthand for `self.module_addresses.get(kind)`.
    pub fn module(&self, kind: ModuleKind) -> Option<Address> {
        self.module_addresses.get(kind)
    }

    /// Record the deployer contract address. It is set once and never changes.
    pub fn record_deployer(&mut self, address: Address) -> Result<()> {
        match self.deployer_address {
            Some(existing) if existing != address => anyhow::bail!(
                "Chain {} already has deployer {}, refusing to replace it with {}",
                self.chain_id,
                existing,
                address
            ),
            _ => {
                self.deployer_address = Some(address);
                Ok(())
            }
        }
    }

    /// Record the address of a deployed module.
    ///
    /// The vault-module can only be recorded once its controller is known, since
    /// the controller is the one that creates it.
    pub fn record_module(&mut self, kind: ModuleKind, address: Address) -> Result<()> {
        if kind == ModuleKind::VaultModule && self.module_addresses.vault_controller.is_none() {
            anyhow::bail!(
                "Chain {} has no vault-controller, cannot record a vault-module",
                self.chain_id
            );
        }

        let chain_id = self.chain_id;
        let slot = self.module_addresses.slot_mut(kind);
        match *slot {
            Some(existing) if existing != address => anyhow::bail!(
                "Chain {} already has {} at {}, refusing to replace it with {}",
                chain_id,
                kind,
                existing,
                address
            ),
            _ => {
                *slot = Some(address);
                Ok(())
            }
        }
    }

    /// Mark the routing-gateway as registered with the vault-controller.
    pub fn mark_gateway_linked(&mut self) -> Result<()> {
        if self.module_addresses.routing_gateway.is_none()
            || self.module_addresses.vault_controller.is_none()
        {
            anyhow::bail!(
                "Chain {} cannot link its gateway before both the routing-gateway and the vault-controller are deployed",
                self.chain_id
            );
        }
        self.gateway_linked = true;
        Ok(())
    }

    /// Whether a module is already listed in the catalog.
    pub fn is_listed(&self, module_address: Address) -> bool {
        self.module_listings
            .iter()
            .any(|listing| listing.module_address == module_address)
    }

    /// Append a catalog listing. Returns `false` if the module was already listed.
    pub fn add_listing(&mut self, listing: ModuleListing) -> bool {
        if self.is_listed(listing.module_address) {
            return false;
        }
        self.module_listings.push(listing);
        true
    }

    /// Set the cross-chain links. Links are configured once per chain.
    pub fn set_links(&mut self, links: Vec<GatewayLink>) -> Result<()> {
        if !self.links.is_empty() {
            anyhow::bail!("Chain {} already has {} links configured", self.chain_id, self.links.len());
        }
        self.links = links;
        Ok(())
    }

    /// Check the structural invariants of a record read from storage.
    pub fn validate(&self) -> Result<()> {
        let modules = &self.module_addresses;

        if modules.vault_module.is_some() && modules.vault_controller.is_none() {
            anyhow::bail!(
                "Chain {} records a vault-module without a vault-controller",
                self.chain_id
            );
        }

        if self.gateway_linked
            && (modules.routing_gateway.is_none() || modules.vault_controller.is_none())
        {
            anyhow::bail!(
                "Chain {} is marked gateway-linked without a routing-gateway and vault-controller",
                self.chain_id
            );
        }

        if !self.links.is_empty() && modules.routing_gateway.is_none() {
            anyhow::bail!("Chain {} has links but no routing-gateway", self.chain_id);
        }

        if self.links.iter().any(|link| link.target_chain_id == self.chain_id) {
            anyhow::bail!("Chain {} links to itself", self.chain_id);
        }

        Ok(())
    }
}
