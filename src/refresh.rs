use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::DataFreshConfig;
use crate::drivers::{Engine, selector};
use crate::error::{Error, Result};
use crate::integrity::IntegrityBracket;
use crate::model::{Direction, Naming, TableRef};
use crate::snapshot::{self, SnapshotStore};
use crate::tracking::{PreparedState, TrackingStore};
use crate::transfer::{BulkTransfer, TransferExecutor, TransferReport};

/// Identity counters restart here before a reload, so reloaded rows keep their values.
pub const IDENTITY_RESEED: i64 = 0;

#[derive(Debug)]
pub struct RefreshSummary {
    /// Tables whose foreign keys were suspended.
    pub bracketed: Vec<TableRef>,
    /// Tables emptied and reloaded from their baseline.
    pub reloaded: TransferReport,
    pub elapsed: Duration,
}

/// Resets a database to its captured baseline between test runs.
pub struct DataFresh {
    engine: Arc<dyn Engine>,
    config: DataFreshConfig,
    catalog: Catalog,
    tracking: TrackingStore,
    store: Arc<dyn SnapshotStore>,
    executor: TransferExecutor,
}

impl DataFresh {
    /// Validate `config`, open its target and wire the configured snapshot backend.
    pub fn open(config: DataFreshConfig) -> Result<Self> {
        config.validate()?;
        let engine = selector::open_engine(&config.target, config.statement_timeout())?;
        Self::new(engine, config)
    }

    pub fn new(engine: Arc<dyn Engine>, config: DataFreshConfig) -> Result<Self> {
        config.validate()?;
        let naming = Naming::default();
        let (store, transfer) = snapshot::backend_for(&config, engine.clone(), &naming)?;
        debug!(
            engine = engine.name(),
            database = %engine.database(),
            storage = ?config.storage,
            "datafresh opened"
        );
        Ok(Self::with_backend(engine, config, naming, store, transfer))
    }

    /// Assemble with an explicit snapshot backend.
    pub fn with_backend(
        engine: Arc<dyn Engine>,
        config: DataFreshConfig,
        naming: Naming,
        store: Arc<dyn SnapshotStore>,
        transfer: Arc<dyn BulkTransfer>,
    ) -> Self {
        let catalog = Catalog::new(engine.clone(), naming.clone(), config.reference_closure);
        let tracking = TrackingStore::new(engine.clone(), naming);
        let executor = TransferExecutor::new(transfer, config.batch_size, config.worker_count(), config.verbose);
        Self { engine, config, catalog, tracking, store, executor }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn config(&self) -> &DataFreshConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn state(&self) -> Result<PreparedState> {
        self.tracking.state()
    }

    /// Install the tracking store and a mutation hook on every table, then
    /// optionally capture the baseline. Safe to repeat; repeating discards
    /// pending change records.
    pub fn prepare(&self, create_snapshot: bool) -> Result<()> {
        let started = Instant::now();
        let db = self.engine.database();
        info!(database = %db, create_snapshot, "prepare started");

        let tables = self.catalog.list_all_base_tables()?;
        self.tracking.install(&tables)?;

        if create_snapshot {
            self.create_snapshot()?;
        }

        info!(database = %db, tables = tables.len(), elapsed_ms = ms(started), "prepare complete");
        Ok(())
    }

    /// Overwrite the baseline of every table with its current rows.
    pub fn create_snapshot(&self) -> Result<TransferReport> {
        let started = Instant::now();
        let db = self.engine.database();
        info!(database = %db, "create snapshot started");
        self.tracking.guard_prepared()?;

        let tables = self.catalog.list_all_base_tables()?;
        for table in &tables {
            self.store.prepare_entry(table)?;
        }
        let report = self.executor.run(&tables, Direction::ToSnapshot)?.into_result()?;

        info!(
            database = %db,
            tables = report.attempted(),
            rows = report.total_rows(),
            elapsed_ms = ms(started),
            "create snapshot complete"
        );
        Ok(report)
    }

    /// Restore the tables recorded as changed since the last refresh.
    ///
    /// Not atomic: each step commits on its own. Once the tracking store has
    /// been cleared, a failure part-way leaves deleted tables empty and the
    /// store without a record of them.
    pub fn refresh(&self) -> Result<RefreshSummary> {
        let started = Instant::now();
        let db = self.engine.database();
        info!(database = %db, "refresh started");
        self.tracking.guard_prepared()?;

        // Both sets are read before the store is cleared.
        let changed_and_referenced = self.catalog.list_changed_and_referenced_tables()?;
        let changed = self.catalog.list_changed_tables()?;

        self.tracking.clear()?;

        let summary = self.restore(changed_and_referenced, &changed, true, started)?;
        info!(
            database = %db,
            reloaded = summary.reloaded.attempted(),
            bracketed = summary.bracketed.len(),
            elapsed_ms = ms(started),
            "refresh complete"
        );
        Ok(summary)
    }

    /// Restore changed tables with foreign keys suspended on every table.
    /// Tracking records are left as they are.
    pub fn refresh_entire(&self) -> Result<RefreshSummary> {
        let started = Instant::now();
        let db = self.engine.database();
        info!(database = %db, "refresh entire started");
        self.tracking.guard_prepared()?;

        let all = self.catalog.list_all_base_tables()?;
        let changed = self.catalog.list_changed_tables()?;

        let summary = self.restore(all, &changed, false, started)?;
        info!(
            database = %db,
            reloaded = summary.reloaded.attempted(),
            bracketed = summary.bracketed.len(),
            elapsed_ms = ms(started),
            "refresh entire complete"
        );
        Ok(summary)
    }

    /// True when any user table has a tracking record.
    pub fn has_database_been_modified(&self) -> Result<bool> {
        self.tracking.guard_prepared()?;
        self.tracking.has_records()
    }

    /// Remove hooks, baselines and the tracking store. Fine on a database that
    /// was never prepared.
    pub fn teardown(&self) -> Result<()> {
        let started = Instant::now();
        let db = self.engine.database();
        info!(database = %db, "teardown started");

        for table in self.catalog.list_all_base_tables()? {
            self.tracking.remove_hook(&table)?;
            self.store.drop_entry(&table)?;
        }
        self.tracking.drop_store()?;

        info!(database = %db, elapsed_ms = ms(started), "teardown complete");
        Ok(())
    }

    /// Bracket `bracket`, empty and reseed `changed`, reload them, then always
    /// re-enable foreign keys.
    fn restore(
        &self,
        bracket: Vec<TableRef>,
        changed: &[TableRef],
        forget_records: bool,
        started: Instant,
    ) -> Result<RefreshSummary> {
        let guard = IntegrityBracket::disable(self.engine.clone(), &bracket)?;

        let reloaded = self.empty_and_reload(changed, forget_records);
        let enabled = guard.enable();

        let reloaded = match (reloaded, enabled) {
            (Ok(report), Ok(())) => report,
            (Err(err), enabled) => {
                if let Err(e) = enabled {
                    warn!(error = %e, "foreign keys not fully re-enabled after failed restore");
                }
                return Err(err);
            }
            (Ok(_), Err(err)) => return Err(err),
        };

        let reloaded = reloaded.into_result()?;
        Ok(RefreshSummary { bracketed: bracket, reloaded, elapsed: started.elapsed() })
    }

    fn empty_and_reload(&self, changed: &[TableRef], forget_records: bool) -> Result<TransferReport> {
        let tracking = if forget_records { None } else { Some(self.tracking.table()) };
        for table in changed {
            self.engine.delete_rows(table, tracking)?;
            if forget_records {
                self.tracking.forget(table)?;
            }
            if self.engine.has_identity(table)? {
                self.engine.reseed_identity(table, IDENTITY_RESEED)?;
            }
        }
        self.executor.run(changed, Direction::FromSnapshot)
    }
}

fn ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
