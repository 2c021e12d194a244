//! Build artifacts of the on-chain modules.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{B256, Bytes, keccak256};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::record::ModuleKind;

/// Artifact name of the per-chain deterministic deployer contract.
pub const DEPLOYER_ARTIFACT: &str = "Deployer";

/// Artifact name of a module, `None` for modules that are created by another
/// module instead of being deployed directly.
pub fn artifact_name(kind: ModuleKind) -> Option<&'static str> {
    match kind {
        ModuleKind::RoutingGateway => Some("NexusGateway"),
        ModuleKind::VaultController => Some("VaultV1Controller"),
        ModuleKind::VaultModule => None,
        ModuleKind::ModuleCatalog => Some("FacetCatalog"),
        ModuleKind::LoupeModule => Some("DiamondLoupeFacet"),
        ModuleKind::Factory => Some("NexusFactory"),
    }
}

/// The subset of a compiler artifact this crate needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    bytecode: Bytes,
}

/// Creation bytecode of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArtifact {
    pub name: String,
    pub bytecode: Bytes,
}

impl ModuleArtifact {
    pub fn new(name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
        }
    }

    /// Keccak-256 hash of the creation bytecode.
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }

    /// Read an artifact file (`{"contractName": ..., "bytecode": "0x..."}`).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if file.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no creation bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        let name = match file.contract_name {
            Some(name) => name,
            None => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .context("Artifact path has no file name")?
                .to_string(),
        };

        Ok(Self::new(name, file.bytecode))
    }
}

/// Every artifact needed to provision a chain.
#[derive(Debug, Clone)]
pub struct ModuleArtifacts {
    pub deployer: ModuleArtifact,
    pub loupe_module: ModuleArtifact,
    pub factory: ModuleArtifact,
    pub module_catalog: ModuleArtifact,
    pub vault_controller: ModuleArtifact,
    pub routing_gateway: ModuleArtifact,
}

impl ModuleArtifacts {
    /// Load all artifacts from `<dir>/<ArtifactName>.json`.
    pub fn load_from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let load = |name: &str| ModuleArtifact::load_from_file(&dir.join(format!("{}.json", name)));
        let load_module = |kind: ModuleKind| {
            let name = artifact_name(kind)
                .with_context(|| format!("{} has no build artifact", kind))?;
            load(name)
        };

        let artifacts = Self {
            deployer: load(DEPLOYER_ARTIFACT)?,
            loupe_module: load_module(ModuleKind::LoupeModule)?,
            factory: load_module(ModuleKind::Factory)?,
            module_catalog: load_module(ModuleKind::ModuleCatalog)?,
            vault_controller: load_module(ModuleKind::VaultController)?,
            routing_gateway: load_module(ModuleKind::RoutingGateway)?,
        };

        tracing::debug!(path = %dir.display(), "Module artifacts loaded");
        Ok(artifacts)
    }

    /// Artifact of a directly deployed module.
    pub fn module(&self, kind: ModuleKind) -> Option<&ModuleArtifact> {
        match kind {
            ModuleKind::RoutingGateway => Some(&self.routing_gateway),
            ModuleKind::VaultController => Some(&self.vault_controller),
            ModuleKind::VaultModule => None,
            ModuleKind::ModuleCatalog => Some(&self.module_catalog),
            ModuleKind::LoupeModule => Some(&self.loupe_module),
            ModuleKind::Factory => Some(&self.factory),
        }
    }
}
