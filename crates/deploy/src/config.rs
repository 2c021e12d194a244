//! Fleet configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::{Address, U256, address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::Confirmations,
    deployer::ModuleDeployer,
    rpc::DEFAULT_POLL_INTERVAL,
    store::Network,
};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Nexus.toml";

/// Per-chain values baked into the deployed modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParameters {
    /// Name of the chain on the cross-chain messaging network.
    pub chain_label: String,
    /// Token fees are paid in.
    pub fee_token: Address,
    /// Fee charged by the factory module for every creation.
    #[serde(default)]
    pub creation_fee: U256,
    /// Messaging-bus gateway the routing-gateway sends through.
    pub messaging_gateway: Address,
    /// Messaging-bus gas service paying for cross-chain execution.
    pub messaging_gas_service: Address,
    /// Catalog fee of the vault-module.
    #[serde(default)]
    pub vault_module_fee: U256,
    /// Catalog fee of the loupe-module.
    #[serde(default)]
    pub loupe_module_fee: U256,
}

/// A chain of the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Connection name of the chain.
    pub network: String,
    /// JSON-RPC endpoint of a node holding the signer account.
    pub rpc_url: Url,
    /// Protocol-level chain identifier, embedded in the modules.
    pub chain_id: u64,
    pub parameters: ChainParameters,
}

/// Configuration of the whole fleet, for both namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
    /// Root of the deployment record store.
    pub records_dir: PathBuf,
    /// Directory holding the compiled module artifacts.
    pub artifacts_dir: PathBuf,
    /// Confirmations required for module deployments and calls.
    pub confirmations: u64,
    /// Confirmations required for the deployer contract.
    pub deployer_confirmations: u64,
    /// Maximum time to wait for the required confirmations.
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls.
    pub poll_interval_millis: u64,
    /// Chains of the test namespace, in provisioning order.
    pub testnet: Vec<ChainEntry>,
    /// Chains of the production namespace, in provisioning order.
    pub mainnet: Vec<ChainEntry>,
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            records_dir: PathBuf::from("deployment"),
            artifacts_dir: PathBuf::from("artifacts"),
            confirmations: 1,
            deployer_confirmations: 5,
            confirmation_timeout_secs: 300,
            poll_interval_millis: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            testnet: default_testnet_chains(),
            mainnet: Vec::new(),
        }
    }
}

/// Axelar gas service, shared by the test networks.
const TESTNET_GAS_SERVICE: Address = address!("0xbE406F0189A0B4cf3A05C286473D23791Dd44Cc6");

fn default_testnet_chains() -> Vec<ChainEntry> {
    vec![
        ChainEntry {
            network: "fantom_testnet".to_string(),
            rpc_url: local_rpc(8545),
            chain_id: 1,
            parameters: ChainParameters {
                chain_label: "Fantom".to_string(),
                fee_token: address!("0xf1277d1ed8ad466beddf92ef448a132661956621"),
                creation_fee: U256::ZERO,
                messaging_gateway: address!("0x97837985Ec0494E7b9C71f5D3f9250188477ae14"),
                messaging_gas_service: TESTNET_GAS_SERVICE,
                vault_module_fee: U256::ZERO,
                loupe_module_fee: U256::ZERO,
            },
        },
        ChainEntry {
            network: "polygon_testnet".to_string(),
            rpc_url: local_rpc(8546),
            chain_id: 2,
            parameters: ChainParameters {
                chain_label: "Polygon".to_string(),
                fee_token: address!("0x9c3c9283d3e44854697cd22d3faa240cfb032889"),
                creation_fee: U256::ZERO,
                messaging_gateway: address!("0xBF62ef1486468a6bd26Dd669C06db43dEd5B849B"),
                messaging_gas_service: TESTNET_GAS_SERVICE,
                vault_module_fee: U256::ZERO,
                loupe_module_fee: U256::ZERO,
            },
        },
    ]
}

fn local_rpc(port: u16) -> Url {
    Url::parse(&format!("http://localhost:{}", port)).expect("local RPC URL should be valid")
}

impl NexusConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.confirmations == 0 || self.deployer_confirmations == 0 {
            anyhow::bail!("Confirmation depths must be at least 1");
        }

        for network in [Network::Testnet, Network::Mainnet] {
            let chains = self.chains(network);
            for (i, chain) in chains.iter().enumerate() {
                if chains[..i].iter().any(|other| other.chain_id == chain.chain_id) {
                    anyhow::bail!("Chain id {} appears twice in the {} fleet", chain.chain_id, network);
                }
                if chains[..i].iter().any(|other| other.network == chain.network) {
                    anyhow::bail!("Network {} appears twice in the {} fleet", chain.network, network);
                }
            }
        }

        Ok(())
    }

    /// The chains of a namespace, in provisioning order.
    pub fn chains(&self, network: Network) -> &[ChainEntry] {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }

    /// Look a chain up by its protocol chain id.
    pub fn chain(&self, network: Network, chain_id: u64) -> Result<&ChainEntry> {
        self.chains(network)
            .iter()
            .find(|chain| chain.chain_id == chain_id)
            .with_context(|| format!("Unsupported chain {} in the {} fleet", chain_id, network))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// Build the module deployer matching the confirmation settings.
    pub fn module_deployer(&self) -> ModuleDeployer {
        let timeout = self.confirmation_timeout();
        ModuleDeployer::new(
            Confirmations::new(self.confirmations, timeout),
            Confirmations::new(self.deployer_confirmations, timeout),
        )
    }
}
