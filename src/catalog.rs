use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ReferenceClosure;
use crate::drivers::Engine;
use crate::error::Result;
use crate::model::{Naming, TableRef};

/// Table listings over the engine's metadata and the tracking store.
#[derive(Clone)]
pub struct Catalog {
    engine: Arc<dyn Engine>,
    naming: Naming,
    closure: ReferenceClosure,
}

impl Catalog {
    pub fn new(engine: Arc<dyn Engine>, naming: Naming, closure: ReferenceClosure) -> Self {
        Self { engine, naming, closure }
    }

    pub fn tracking_store(&self) -> TableRef {
        self.naming.tracking_store_in(self.engine.default_schema())
    }

    /// Every base table except snapshot siblings and the tracking store.
    pub fn list_all_base_tables(&self) -> Result<Vec<TableRef>> {
        let tables = self.engine.base_tables()?;
        Ok(tables
            .into_iter()
            .filter(|t| !self.naming.is_snapshot_name(&t.name) && t.name != self.naming.tracking_store)
            .collect())
    }

    /// Distinct tables with a tracking record. Empty, not an error, when nothing changed.
    pub fn list_changed_tables(&self) -> Result<Vec<TableRef>> {
        let tracked = self.engine.tracked_tables(&self.tracking_store())?;
        let distinct: BTreeSet<TableRef> = tracked
            .into_iter()
            .filter(|t| !self.naming.is_reserved(&t.name))
            .collect();
        Ok(distinct.into_iter().collect())
    }

    /// Changed tables plus the tables their foreign keys reference.
    pub fn list_changed_and_referenced_tables(&self) -> Result<Vec<TableRef>> {
        let changed = self.list_changed_tables()?;
        let mut result: BTreeSet<TableRef> = changed.iter().cloned().collect();
        let mut frontier = changed;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for child in &frontier {
                for parent in self.engine.foreign_key_parents(child)? {
                    if self.naming.is_reserved(&parent.name) {
                        continue;
                    }
                    if result.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            frontier = match self.closure {
                ReferenceClosure::Direct => Vec::new(),
                ReferenceClosure::Transitive => next,
            };
        }

        Ok(result.into_iter().collect())
    }

    pub fn table_exists(&self, table: &TableRef) -> Result<bool> {
        self.engine.table_exists(table)
    }
}
