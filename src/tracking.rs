use std::sync::Arc;
use tracing::debug;

use crate::drivers::Engine;
use crate::error::{Error, Result};
use crate::model::{Naming, TableRef};

/// Whether a database carries the change-tracking store. Always probed, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedState {
    Unprepared,
    Prepared,
}

/// The change-tracking store and the per-table mutation hooks that feed it.
#[derive(Clone)]
pub struct TrackingStore {
    engine: Arc<dyn Engine>,
    naming: Naming,
    store: TableRef,
}

impl TrackingStore {
    pub fn new(engine: Arc<dyn Engine>, naming: Naming) -> Self {
        let store = naming.tracking_store_in(engine.default_schema());
        Self { engine, naming, store }
    }

    pub fn table(&self) -> &TableRef {
        &self.store
    }

    pub fn state(&self) -> Result<PreparedState> {
        if self.engine.table_exists(&self.store)? {
            Ok(PreparedState::Prepared)
        } else {
            Ok(PreparedState::Unprepared)
        }
    }

    pub fn guard_prepared(&self) -> Result<()> {
        match self.state()? {
            PreparedState::Prepared => Ok(()),
            PreparedState::Unprepared => Err(Error::NotPrepared { object: self.store.name.clone() }),
        }
    }

    /// Recreate the store empty and (re)install a hook on every table.
    /// Accumulated but unconsumed change history is discarded.
    pub fn install(&self, tables: &[TableRef]) -> Result<()> {
        self.engine.recreate_tracking_store(&self.store)?;
        for table in tables {
            let hook = self.naming.hook_for(table);
            self.engine.drop_mutation_hook(table, &hook)?;
            self.engine.install_mutation_hook(table, &hook, &self.store)?;
            debug!(table = %table, hook = %hook, "mutation hook installed");
        }
        Ok(())
    }

    pub fn remove_hook(&self, table: &TableRef) -> Result<()> {
        self.engine.drop_mutation_hook(table, &self.naming.hook_for(table))
    }

    pub fn hook_installed(&self, table: &TableRef) -> Result<bool> {
        self.engine.mutation_hook_exists(table, &self.naming.hook_for(table))
    }

    pub fn drop_store(&self) -> Result<()> {
        self.engine.drop_table(&self.store)
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<u64> {
        self.engine.clear_tracking(&self.store, None)
    }

    /// Remove the records of one table.
    pub fn forget(&self, table: &TableRef) -> Result<u64> {
        self.engine.clear_tracking(&self.store, Some(table))
    }

    /// Any record naming a user table.
    pub fn has_records(&self) -> Result<bool> {
        let tracked = self.engine.tracked_tables(&self.store)?;
        Ok(tracked.iter().any(|t| t.name != self.naming.tracking_store && !self.naming.is_snapshot_name(&t.name)))
    }
}
