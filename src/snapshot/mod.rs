use std::sync::Arc;

use crate::config::{DataFreshConfig, StorageKind};
use crate::drivers::Engine;
use crate::error::{Error, Result};
use crate::model::{Naming, TableRef};
use crate::transfer::BulkTransfer;

pub mod flatfile;
pub mod sibling;

pub use flatfile::FlatFiles;
pub use sibling::SiblingTables;

/// Where each table's baseline lives.
pub trait SnapshotStore: Send + Sync {
    /// Ensure an empty destination with the table's current shape.
    fn prepare_entry(&self, table: &TableRef) -> Result<()>;

    fn entry_exists(&self, table: &TableRef) -> Result<bool>;

    /// No-op when absent.
    fn drop_entry(&self, table: &TableRef) -> Result<()>;

    fn location(&self, table: &TableRef) -> String;
}

/// Build the configured backend, exposed both as store and as transfer.
pub fn backend_for(
    config: &DataFreshConfig,
    engine: Arc<dyn Engine>,
    naming: &Naming,
) -> Result<(Arc<dyn SnapshotStore>, Arc<dyn BulkTransfer>)> {
    match config.storage {
        StorageKind::SiblingTable => {
            let backend = Arc::new(SiblingTables::new(engine, naming.clone()));
            let store: Arc<dyn SnapshotStore> = backend.clone();
            let transfer: Arc<dyn BulkTransfer> = backend;
            Ok((store, transfer))
        }
        StorageKind::FlatFile => {
            let root = config
                .snapshot_root
                .clone()
                .ok_or_else(|| Error::Config("flat-file storage requires snapshot_root".into()))?;
            let backend = Arc::new(FlatFiles::new(engine, naming, root));
            let store: Arc<dyn SnapshotStore> = backend.clone();
            let transfer: Arc<dyn BulkTransfer> = backend;
            Ok((store, transfer))
        }
    }
}
