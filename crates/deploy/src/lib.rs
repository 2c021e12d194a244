//! nexus-deploy - Provisioning library for the Nexus cross-chain module mesh.
//!
//! This crate deploys the Nexus modules on every chain of a fleet, keeping a
//! durable per-chain record so that interrupted runs resume where they stopped,
//! and then links the per-chain routing-gateways into a full mesh.

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod deployer;
pub mod fleet;
pub mod link;
pub mod provision;
pub mod record;
pub mod rpc;
pub mod store;

pub use artifacts::{ModuleArtifact, ModuleArtifacts};
pub use chain::{ChainClient, ChainError, Confirmations, Receipt};
pub use config::{CONFIG_FILENAME, ChainEntry, ChainParameters, NexusConfig};
pub use deployer::{ModuleDeployer, deterministic_address};
pub use fleet::{
    ChainConnector, ChainProvisioning, FleetReport, FleetRunner, RpcConnector, link_chain,
};
pub use link::{LinkOutcome, LinkPlan, LinkReconciler, LinkTarget};
pub use provision::{ChainProvisioner, ProvisionReport, ProvisionStep, StepFailure};
pub use record::{ChainDeploymentRecord, GatewayLink, ModuleAddresses, ModuleKind, ModuleListing};
pub use rpc::RpcChainClient;
pub use store::{Network, RecordStore};
