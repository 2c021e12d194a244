//! nexus provisions the Nexus module mesh on a fleet of chains, resuming any
//! interrupted deployment from its persisted records.

mod cli;
mod status;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use nexus_deploy::{
    ChainProvisioning, FleetRunner, ModuleArtifacts, NexusConfig, RecordStore, RpcConnector,
    link_chain,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Command::InitConfig { force } = cli.command {
        if cli.config.exists() && !force {
            anyhow::bail!(
                "{} already exists, pass --force to overwrite it",
                cli.config.display()
            );
        }
        return NexusConfig::default().save_to_file(&cli.config);
    }

    let config = cli::load_config(&cli.config)?;
    let network = cli.network();
    let store = RecordStore::open(&config.records_dir, network)?;

    tracing::info!(
        config_path = %cli.config.display(),
        records = %store.dir().display(),
        %network,
        "Configuration loaded"
    );

    match cli.command {
        Command::Fleet => run_fleet(&config, &store).await,
        Command::Deploy { chain_id } => deploy_chain(&config, &store, chain_id).await,
        Command::Link { chain_id } => {
            let outcome = link_chain(&config, &store, &connector(&config), chain_id).await?;
            tracing::info!(chain_id, ?outcome, "Link reconciliation done");
            Ok(())
        }
        Command::Status => status::print_status(&config, &store),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_artifacts(config: &NexusConfig) -> Result<ModuleArtifacts> {
    ModuleArtifacts::load_from_dir(&config.artifacts_dir).context("Failed to load module artifacts")
}

fn connector(config: &NexusConfig) -> RpcConnector {
    RpcConnector {
        poll_interval: config.poll_interval(),
    }
}

fn runner<'a>(
    config: &'a NexusConfig,
    store: &'a RecordStore,
    artifacts: &'a ModuleArtifacts,
) -> FleetRunner<'a, RpcConnector> {
    FleetRunner::new(config, store, artifacts, connector(config))
}

async fn run_fleet(config: &NexusConfig, store: &RecordStore) -> Result<()> {
    let artifacts = load_artifacts(config)?;
    let report = runner(config, store, &artifacts).run().await?;

    let incomplete: Vec<String> = report
        .provisioned
        .iter()
        .filter(|(_, provisioning)| !provisioning.is_complete())
        .map(|(chain_id, provisioning)| match provisioning {
            ChainProvisioning::Ran(run) => match &run.failure {
                Some(failure) => format!("{} (stopped at {})", chain_id, failure.step),
                None => chain_id.to_string(),
            },
            ChainProvisioning::Unreachable(_) => format!("{} (unreachable)", chain_id),
        })
        .collect();

    if !incomplete.is_empty() {
        anyhow::bail!(
            "Fleet is not fully provisioned: {}. Run again to resume.",
            incomplete.join(", ")
        );
    }

    Ok(())
}

async fn deploy_chain(config: &NexusConfig, store: &RecordStore, chain_id: u64) -> Result<()> {
    let artifacts = load_artifacts(config)?;
    let report = runner(config, store, &artifacts)
        .provision_chain(chain_id)
        .await?;

    match report.failure {
        None => Ok(()),
        Some(failure) => {
            let hint = if failure.is_retryable() {
                "run again to resume"
            } else {
                "the transaction reverted, inspect it before retrying"
            };
            Err(failure.error.context(format!(
                "Chain {} stopped at step {}: {}",
                chain_id, failure.step, hint
            )))
        }
    }
}
