use std::sync::Arc;

use super::SnapshotStore;
use crate::drivers::Engine;
use crate::error::{Error, Result};
use crate::model::{Naming, TableRef};
use crate::transfer::{BulkTransfer, TableTransfer, each_table};

/// Baselines kept as `<table>__backup` tables in the same schema.
pub struct SiblingTables {
    engine: Arc<dyn Engine>,
    naming: Naming,
    tracking: TableRef,
}

impl SiblingTables {
    pub fn new(engine: Arc<dyn Engine>, naming: Naming) -> Self {
        let tracking = naming.tracking_store_in(engine.default_schema());
        Self { engine, naming, tracking }
    }

    fn restore(&self, table: &TableRef) -> Result<u64> {
        let sibling = self.naming.snapshot_of(table);
        if !self.engine.table_exists(&sibling)? {
            return Err(Error::snapshot(table, format!("no baseline at {}", sibling)));
        }
        let live = self.engine.columns(table)?;
        let base = self.engine.columns(&sibling)?;
        if live != base {
            return Err(Error::snapshot(
                table,
                format!("shape mismatch: live {:?}, baseline {:?}", live, base),
            ));
        }
        self.engine.copy_rows(&sibling, table, Some(&self.tracking))
    }
}

impl SnapshotStore for SiblingTables {
    fn prepare_entry(&self, table: &TableRef) -> Result<()> {
        self.engine.clone_shape(table, &self.naming.snapshot_of(table))
    }

    fn entry_exists(&self, table: &TableRef) -> Result<bool> {
        self.engine.table_exists(&self.naming.snapshot_of(table))
    }

    fn drop_entry(&self, table: &TableRef) -> Result<()> {
        self.engine.drop_table(&self.naming.snapshot_of(table))
    }

    fn location(&self, table: &TableRef) -> String {
        self.naming.snapshot_of(table).to_string()
    }
}

impl BulkTransfer for SiblingTables {
    fn name(&self) -> &'static str {
        "sibling-table"
    }

    fn to_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
        Ok(each_table(batch, |t| self.engine.copy_rows(t, &self.naming.snapshot_of(t), None)))
    }

    fn from_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
        Ok(each_table(batch, |t| self.restore(t)))
    }
}
