use std::collections::BTreeMap;

use anyhow::Result;
use comfy_table::{Table, presets::UTF8_FULL};
use nexus_deploy::{ChainDeploymentRecord, ModuleKind, NexusConfig, ProvisionStep, RecordStore};
use strum::IntoEnumIterator;

/// Print the state of every configured or recorded chain of the namespace.
pub fn print_status(config: &NexusConfig, store: &RecordStore) -> Result<()> {
    let table = status_table(config, store)?;
    println!("{table}");
    Ok(())
}

fn status_table(config: &NexusConfig, store: &RecordStore) -> Result<Table> {
    let mut chains: BTreeMap<u64, Option<ChainDeploymentRecord>> = config
        .chains(store.network())
        .iter()
        .map(|chain| (chain.chain_id, None))
        .collect();
    for record in store.list()? {
        chains.insert(record.chain_id, Some(record));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Chain",
        "Label",
        "Modules",
        "Routing gateway",
        "Gateway linked",
        "Listings",
        "Links",
        "Next step",
    ]);

    for (chain_id, record) in chains {
        let row = match record {
            None => vec![
                chain_id.to_string(),
                "-".to_string(),
                format!("0/{}", ModuleKind::iter().count()),
                "-".to_string(),
                "no".to_string(),
                "0".to_string(),
                "0".to_string(),
                ProvisionStep::Deployer.to_string(),
            ],
            Some(record) => {
                let next_step = ProvisionStep::iter()
                    .find(|step| !step.is_satisfied(&record))
                    .map(|step| step.to_string())
                    .unwrap_or_else(|| "done".to_string());

                vec![
                    chain_id.to_string(),
                    record.chain_label.clone(),
                    format!(
                        "{}/{}",
                        record.module_addresses.deployed_count(),
                        ModuleKind::iter().count()
                    ),
                    record
                        .module(ModuleKind::RoutingGateway)
                        .map(|address| address.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    if record.gateway_linked { "yes" } else { "no" }.to_string(),
                    record.module_listings.len().to_string(),
                    record.links.len().to_string(),
                    next_step,
                ]
            }
        };
        table.add_row(row);
    }

    Ok(table)
}
