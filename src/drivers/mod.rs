use crate::error::Result;
use crate::model::{Row, TableRef};

pub mod selector;
pub mod sqlite;

/// The relational engine a database lives in.
///
/// Everything the refresh machinery needs from the engine is expressed here as a
/// capability, so the engine decides how triggers, constraints and identities are
/// spelled. Each call is an independent round trip; nothing is wrapped in an
/// outer transaction.
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Human-readable database label for progress messages.
    fn database(&self) -> String;

    /// Schema bookkeeping objects are created in.
    fn default_schema(&self) -> &str;

    /// Every base table, in a deterministic order. Engine-internal tables are omitted.
    fn base_tables(&self) -> Result<Vec<TableRef>>;

    fn table_exists(&self, table: &TableRef) -> Result<bool>;

    /// Column names in declaration order.
    fn columns(&self, table: &TableRef) -> Result<Vec<String>>;

    /// Tables referenced by foreign keys declared on `child`.
    fn foreign_key_parents(&self, child: &TableRef) -> Result<Vec<TableRef>>;

    fn has_identity(&self, table: &TableRef) -> Result<bool>;

    fn reseed_identity(&self, table: &TableRef, seed: i64) -> Result<()>;

    /// Drop `store` if present and create it again, empty.
    fn recreate_tracking_store(&self, store: &TableRef) -> Result<()>;

    /// Distinct tables with at least one record in `store`.
    fn tracked_tables(&self, store: &TableRef) -> Result<Vec<TableRef>>;

    /// Delete tracking records, either all of them or only those of `table`.
    fn clear_tracking(&self, store: &TableRef, table: Option<&TableRef>) -> Result<u64>;

    /// Arrange for any insert, update or delete on `table` to leave a presence
    /// record in `store`. Must not change the row counts reported to the caller
    /// of the mutating statement.
    fn install_mutation_hook(&self, table: &TableRef, hook: &str, store: &TableRef) -> Result<()>;

    /// No-op when the hook is absent.
    fn drop_mutation_hook(&self, table: &TableRef, hook: &str) -> Result<()>;

    fn mutation_hook_exists(&self, table: &TableRef, hook: &str) -> Result<bool>;

    /// No-op when the table is absent.
    fn drop_table(&self, table: &TableRef) -> Result<()>;

    /// Make `dest` an empty table with the columns of `source`: create it when
    /// absent, clear it when the shape matches, rebuild it when it does not.
    fn clone_shape(&self, source: &TableRef, dest: &TableRef) -> Result<()>;

    /// Delete every row of `table`. With `tracking` set, records the delete
    /// itself leaves in that store are discarded.
    fn delete_rows(&self, table: &TableRef, tracking: Option<&TableRef>) -> Result<u64>;

    /// Copy every row of `source` into `dest`, values untouched. With
    /// `tracking` set, records the load itself leaves in that store are discarded.
    fn copy_rows(&self, source: &TableRef, dest: &TableRef, tracking: Option<&TableRef>) -> Result<u64>;

    /// Stream every row of `table` to `sink`, in storage order.
    fn export_rows(&self, table: &TableRef, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64>;

    /// Insert `rows` into `table` using `columns`, atomically.
    fn import_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
        tracking: Option<&TableRef>,
    ) -> Result<u64>;

    fn disable_foreign_keys(&self, table: &TableRef) -> Result<()>;

    /// Resume enforcement without re-validating existing rows.
    fn enable_foreign_keys(&self, table: &TableRef) -> Result<()>;

    fn foreign_keys_enabled(&self, table: &TableRef) -> Result<bool>;
}
