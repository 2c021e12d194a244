use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use nexus_deploy::{CONFIG_FILENAME, Network, NexusConfig};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "nexus")]
#[command(
    author,
    version,
    about = "Provision the Nexus modules on every chain of a fleet and link them together"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "NEXUS_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// Values missing from the file fall back to the built-in defaults, and any
    /// value can be overridden with a `NEXUS_<KEY>` environment variable
    /// (nested keys separated by `__`).
    #[arg(long, alias = "conf", global = true, env = "NEXUS_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Target the test namespace instead of the production one.
    #[arg(long, global = true, env = "NEXUS_TESTNET")]
    pub testnet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Provision every configured chain, then link all of them.
    Fleet,

    /// Provision a single chain.
    Deploy {
        /// Protocol chain id of the chain to provision.
        #[arg(long, alias = "chain")]
        chain_id: u64,
    },

    /// Configure the cross-chain routes of a single chain.
    Link {
        /// Protocol chain id of the chain to link.
        #[arg(long, alias = "chain")]
        chain_id: u64,
    },

    /// Show the provisioning state of every chain of the namespace.
    Status,

    /// Write the default configuration to the configuration path.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn network(&self) -> Network {
        Network::from_testnet_flag(self.testnet)
    }
}

/// Environment variables consumed by the CLI itself rather than the config.
const CLI_ENV_KEYS: [&str; 3] = ["config", "testnet", "verbosity"];

/// Layer defaults, the configuration file and the environment.
pub fn load_config(path: &Path) -> Result<NexusConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No configuration file, using defaults");
    }

    let config: NexusConfig = Figment::from(Serialized::defaults(NexusConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NEXUS_").ignore(&CLI_ENV_KEYS).split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    config.validate()?;
    Ok(config)
}
