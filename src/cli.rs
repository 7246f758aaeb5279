use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use datafresh::StorageKind;

/// datafresh: reset a test database to its baseline between runs
#[derive(Parser, Debug)]
#[command(name = "datafresh", version, about = "Track, snapshot and restore test databases.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file (defaults to the nearest .datafresh.json)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Show progress while working
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a .datafresh.json for a database in the current directory
    Init {
        /// Database address (e.g., sqlite://./app.db or app.sqlite)
        target: String,
        /// Where baselines are kept
        #[arg(long, value_enum, default_value_t = Storage::SiblingTable)]
        storage: Storage,
        /// Directory for flat-file baselines
        #[arg(long, value_name = "dir")]
        snapshot_root: Option<PathBuf>,
        /// Transfer worker threads
        #[arg(long)]
        workers: Option<usize>,
        /// Tables per transfer batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Install change tracking on every table and capture a baseline
    Prepare {
        /// Only install tracking; keep any existing baseline
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Capture the current data as the new baseline
    Snapshot,

    /// Restore changed tables from the baseline
    Refresh {
        /// Suspend foreign keys on every table, not just changed ones and their parents
        #[arg(long)]
        entire: bool,
    },

    /// Show whether the database is prepared and what changed
    Status,

    /// List base tables with their tracking and baseline state
    Tables,

    /// Remove tracking, hooks and baselines
    Teardown {
        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Print CLI version
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Storage {
    SiblingTable,
    FlatFile,
}

impl From<Storage> for StorageKind {
    fn from(s: Storage) -> Self {
        match s {
            Storage::SiblingTable => StorageKind::SiblingTable,
            Storage::FlatFile => StorageKind::FlatFile,
        }
    }
}
