use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DataFreshConfig {
    /// Database address, e.g. `sqlite://./app.db` or `tests/app.sqlite`.
    pub target: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub storage: StorageKind,
    /// Directory holding flat-file baselines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_root: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Transfer worker threads; host parallelism (max 8) when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
    #[serde(default)]
    pub reference_closure: ReferenceClosure,
}

/// Where baselines live.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// `<table>__backup` next to each table.
    #[default]
    SiblingTable,
    /// One file per table under `snapshot_root`.
    FlatFile,
}

/// How far foreign-key parents of changed tables are followed for the constraint bracket.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceClosure {
    /// Parents of changed tables only.
    #[default]
    Direct,
    /// Parents, their parents, and so on.
    Transitive,
}

fn default_batch_size() -> usize {
    20
}

fn default_statement_timeout() -> u64 {
    1200
}

impl DataFreshConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            verbose: false,
            storage: StorageKind::default(),
            snapshot_root: None,
            batch_size: default_batch_size(),
            workers: None,
            statement_timeout_secs: default_statement_timeout(),
            reference_closure: ReferenceClosure::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageKind::FlatFile && self.snapshot_root.is_none() {
            return Err(Error::Config("flat-file storage requires snapshot_root".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.statement_timeout_secs == 0 {
            return Err(Error::Config("statement_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8)
        })
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}
