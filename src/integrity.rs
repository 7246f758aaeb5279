use std::sync::Arc;
use tracing::{debug, warn};

use crate::drivers::Engine;
use crate::error::Result;
use crate::model::TableRef;

/// Foreign-key enforcement suspended on a set of tables.
///
/// Obtained from [`IntegrityBracket::disable`]; [`IntegrityBracket::enable`]
/// must be called on every path out, success or failure.
#[must_use = "foreign keys stay disabled until enable() is called"]
pub struct IntegrityBracket {
    engine: Arc<dyn Engine>,
    tables: Vec<TableRef>,
}

impl IntegrityBracket {
    /// Disable enforcement on each table in order. If one fails, the tables
    /// already disabled are re-enabled before the error is returned.
    pub fn disable(engine: Arc<dyn Engine>, tables: &[TableRef]) -> Result<Self> {
        let mut bracket = Self { engine, tables: Vec::with_capacity(tables.len()) };
        for table in tables {
            if let Err(err) = bracket.engine.disable_foreign_keys(table) {
                if let Err(undo) = bracket.enable() {
                    warn!(error = %undo, "could not re-enable foreign keys after failed disable");
                }
                return Err(err);
            }
            bracket.tables.push(table.clone());
        }
        debug!(tables = bracket.tables.len(), "foreign keys disabled");
        Ok(bracket)
    }

    /// Re-enable every table, without re-validating data. Keeps going past
    /// failures and returns the first one.
    pub fn enable(&self) -> Result<()> {
        let mut first_err = None;
        for table in &self.tables {
            if let Err(err) = self.engine.enable_foreign_keys(table) {
                warn!(table = %table, error = %err, "failed to re-enable foreign keys");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => {
                debug!(tables = self.tables.len(), "foreign keys enabled");
                Ok(())
            }
        }
    }
}
