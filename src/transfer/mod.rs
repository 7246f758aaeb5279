use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{Direction, TableRef};

/// Outcome of moving one table: rows copied, or why not.
#[derive(Debug)]
pub struct TableTransfer {
    pub table: TableRef,
    pub result: Result<u64>,
}

/// Moves whole tables between the live schema and the snapshot store.
///
/// Both methods receive one batch. Returning `Err` means the transport for the
/// whole batch aborted and every table in it is reported failed; otherwise each
/// table carries its own result.
pub trait BulkTransfer: Send + Sync {
    fn name(&self) -> &'static str;
    fn to_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>>;
    fn from_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>>;
}

/// Run `f` for every table of a batch, independently.
pub fn each_table<F>(batch: &[TableRef], mut f: F) -> Vec<TableTransfer>
where
    F: FnMut(&TableRef) -> Result<u64>,
{
    batch
        .iter()
        .map(|table| TableTransfer { table: table.clone(), result: f(table) })
        .collect()
}

#[derive(Debug)]
pub struct TransferReport {
    pub direction: Direction,
    pub outcomes: Vec<TableTransfer>,
}

impl TransferReport {
    pub fn empty(direction: Direction) -> Self {
        Self { direction, outcomes: Vec::new() }
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&TableRef, &Error)> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err().map(|e| (&o.table, e)))
    }

    pub fn total_rows(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).sum()
    }

    pub fn rows_for(&self, table: &TableRef) -> Option<u64> {
        self.outcomes
            .iter()
            .find(|o| &o.table == table)
            .and_then(|o| o.result.as_ref().ok().copied())
    }

    /// `Err(Error::Transfer)` unless every table made it.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(Error::Transfer {
            direction: self.direction,
            attempted: self.attempted(),
            failed: self.failures().map(|(t, e)| (t.clone(), e.to_string())).collect(),
        })
    }
}

/// Splits tables into batches and runs them on a bounded worker pool.
pub struct TransferExecutor {
    transfer: Arc<dyn BulkTransfer>,
    batch_size: usize,
    workers: usize,
    show_progress: bool,
}

impl TransferExecutor {
    pub fn new(transfer: Arc<dyn BulkTransfer>, batch_size: usize, workers: usize, show_progress: bool) -> Self {
        Self {
            transfer,
            batch_size: batch_size.max(1),
            workers: workers.max(1),
            show_progress,
        }
    }

    /// Transfer every table, collecting per-table outcomes in input order.
    /// Failures never stop the remaining batches.
    pub fn run(&self, tables: &[TableRef], direction: Direction) -> Result<TransferReport> {
        if tables.is_empty() {
            return Ok(TransferReport::empty(direction));
        }

        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("datafresh-transfer-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("transfer worker pool: {e}")))?;

        let bar = self.progress_bar(tables.len(), direction);
        let batches: Vec<Vec<TableTransfer>> = pool.install(|| {
            tables
                .par_chunks(self.batch_size)
                .map(|batch| {
                    let outcomes = self.run_batch(batch, direction);
                    bar.inc(batch.len() as u64);
                    outcomes
                })
                .collect()
        });
        bar.finish_and_clear();

        let report = TransferReport { direction, outcomes: batches.into_iter().flatten().collect() };
        info!(
            backend = self.transfer.name(),
            %direction,
            tables = report.attempted(),
            rows = report.total_rows(),
            failed = report.failures().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bulk transfer finished"
        );
        Ok(report)
    }

    fn run_batch(&self, batch: &[TableRef], direction: Direction) -> Vec<TableTransfer> {
        let result = match direction {
            Direction::ToSnapshot => self.transfer.to_snapshot(batch),
            Direction::FromSnapshot => self.transfer.from_snapshot(batch),
        };

        let mut reported = match result {
            Ok(outcomes) => outcomes,
            Err(err) => {
                let message = err.to_string();
                warn!(tables = batch.len(), error = %message, "transfer batch aborted");
                return batch
                    .iter()
                    .map(|t| TableTransfer {
                        table: t.clone(),
                        result: Err(Error::snapshot(t, format!("batch aborted: {message}"))),
                    })
                    .collect();
            }
        };

        // Keep batch order and account for any table the backend did not report on.
        batch
            .iter()
            .map(|t| match reported.iter().position(|o| &o.table == t) {
                Some(i) => reported.swap_remove(i),
                None => TableTransfer {
                    table: t.clone(),
                    result: Err(Error::snapshot(t, "not reported by transfer backend")),
                },
            })
            .inspect(|o| {
                if let Err(e) = &o.result {
                    warn!(table = %o.table, error = %e, "table transfer failed");
                }
            })
            .collect()
    }

    fn progress_bar(&self, len: usize, direction: Direction) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(format!("bulk {direction}"));
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeTransfer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeTransfer {
        fn new() -> Self {
            Self { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) }
        }

        fn batch(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if batch.iter().any(|t| t.name == "poison") {
                return Err(Error::Config("transport exited with status 1".into()));
            }
            Ok(each_table(batch, |t| {
                if t.name == "broken" {
                    Err(Error::snapshot(t, "shape mismatch"))
                } else {
                    Ok(t.name.len() as u64)
                }
            }))
        }
    }

    impl BulkTransfer for FakeTransfer {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn to_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
            self.batch(batch)
        }
        fn from_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
            self.batch(batch)
        }
    }

    fn tables(names: &[&str]) -> Vec<TableRef> {
        names.iter().map(|n| TableRef::new("main", *n)).collect()
    }

    #[test]
    fn failures_are_collected_not_fatal() {
        let exec = TransferExecutor::new(Arc::new(FakeTransfer::new()), 2, 2, false);
        let input = tables(&["a", "bb", "poison", "ccc", "broken", "dddd"]);
        let report = exec.run(&input, Direction::FromSnapshot).unwrap();

        assert_eq!(report.attempted(), 6);
        let order: Vec<&str> = report.outcomes.iter().map(|o| o.table.name.as_str()).collect();
        assert_eq!(order, vec!["a", "bb", "poison", "ccc", "broken", "dddd"]);

        let failed: Vec<&str> = report.failures().map(|(t, _)| t.name.as_str()).collect();
        // "ccc" shares a batch with "poison", so the whole batch fails together.
        assert_eq!(failed, vec!["poison", "ccc", "broken"]);
        assert_eq!(report.rows_for(&TableRef::new("main", "dddd")), Some(4));
        assert_eq!(report.total_rows(), 1 + 2 + 4);

        match report.into_result() {
            Err(Error::Transfer { attempted, failed, .. }) => {
                assert_eq!(attempted, 6);
                assert_eq!(failed.len(), 3);
            }
            other => panic!("expected transfer error, got {other:?}"),
        }
    }

    #[test]
    fn worker_count_bounds_parallel_batches() {
        let fake = Arc::new(FakeTransfer::new());
        let exec = TransferExecutor::new(fake.clone(), 1, 3, false);
        let names: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        let input: Vec<TableRef> = names.iter().map(|n| TableRef::new("main", n.clone())).collect();

        let report = exec.run(&input, Direction::ToSnapshot).unwrap();
        assert!(report.is_complete());
        assert!(fake.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn empty_input_is_a_complete_report() {
        let exec = TransferExecutor::new(Arc::new(FakeTransfer::new()), 20, 4, false);
        let report = exec.run(&[], Direction::ToSnapshot).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.attempted(), 0);
    }
}
