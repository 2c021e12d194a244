//! File-backed deployment record store.
//!
//! Records live in one JSON file per chain under a namespace directory:
//! `<records_dir>/<testnet|mainnet>/<chain_id>.json`. A store only ever sees
//! the namespace it was opened for.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::record::ChainDeploymentRecord;

/// Name of the lock file guarding writes inside a namespace directory.
const LOCK_FILENAME: &str = ".lock";

/// Separates test and production deployments into disjoint namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    Testnet,
    #[default]
    Mainnet,
}

impl Network {
    pub fn from_testnet_flag(testnet: bool) -> Self {
        if testnet { Self::Testnet } else { Self::Mainnet }
    }
}

/// Durable store of [`ChainDeploymentRecord`]s for one namespace.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    network: Network,
}

impl RecordStore {
    /// Open the store for `network` under `records_dir`, creating the namespace
    /// directory if needed.
    pub fn open(records_dir: impl AsRef<Path>, network: Network) -> Result<Self> {
        let dir = records_dir.as_ref().join(network.to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create record directory {}", dir.display()))?;

        tracing::debug!(path = %dir.display(), %network, "Opened record store");

        Ok(Self { dir, network })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a chain.
    pub fn path_for(&self, chain_id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", chain_id))
    }

    /// Load the record of a chain, `None` if it was never targeted.
    ///
    /// A file that exists but cannot be parsed, or whose content violates the
    /// record invariants, is an error.
    pub fn load(&self, chain_id: u64) -> Result<Option<ChainDeploymentRecord>> {
        let path = self.path_for(chain_id);
        if !path.exists() {
            return Ok(None);
        }

        let record = Self::read_record(&path)?;
        if record.chain_id != chain_id {
            anyhow::bail!(
                "Record {} holds chain {} instead of chain {}",
                path.display(),
                record.chain_id,
                chain_id
            );
        }

        Ok(Some(record))
    }

    /// Load the record of a chain, or start a fresh one.
    pub fn load_or_create(&self, chain_id: u64, chain_label: &str) -> Result<ChainDeploymentRecord> {
        match self.load(chain_id)? {
            Some(record) => {
                if record.chain_label != chain_label {
                    tracing::warn!(
                        chain_id,
                        recorded = %record.chain_label,
                        configured = %chain_label,
                        "Chain label differs from the recorded one, keeping the recorded label"
                    );
                }
                Ok(record)
            }
            None => {
                tracing::info!(chain_id, chain_label, network = %self.network, "Creating new deployment record");
                Ok(ChainDeploymentRecord::new(chain_id, chain_label))
            }
        }
    }

    /// Atomically overwrite the record of `record.chain_id`.
    ///
    /// The content is written to a temporary sibling and renamed over the
    /// previous file, so a crash leaves either the old or the new record.
    pub fn save(&self, record: &ChainDeploymentRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;

        let path = self.path_for(record.chain_id);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", record.chain_id));

        let lock = self.lock()?;

        let mut file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move record into {}", path.display()))?;

        FileExt::unlock(&lock).context("Failed to release record store lock")?;

        tracing::debug!(chain_id = record.chain_id, path = %path.display(), "Record saved");
        Ok(())
    }

    /// Load every record of the namespace, ordered by chain id.
    pub fn list(&self) -> Result<Vec<ChainDeploymentRecord>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read record directory {}", self.dir.display()))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to read entry of {}", self.dir.display()))?
                .path();

            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| stem.parse::<u64>().is_ok());
            if !is_record {
                tracing::trace!(path = %path.display(), "Skipping non-record file");
                continue;
            }

            records.push(Self::read_record(&path)?);
        }

        records.sort_by_key(|record| record.chain_id);
        Ok(records)
    }

    fn read_record(path: &Path) -> Result<ChainDeploymentRecord> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record {}", path.display()))?;
        let record: ChainDeploymentRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record {}", path.display()))?;
        record
            .validate()
            .with_context(|| format!("Invalid record {}", path.display()))?;
        Ok(record)
    }

    fn lock(&self) -> Result<File> {
        let path = self.dir.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", path.display()))?;
        Ok(file)
    }
}
