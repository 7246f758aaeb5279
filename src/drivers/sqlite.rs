use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params, params_from_iter};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::Engine;
use crate::error::{Error, Result};
use crate::model::{Row, TableRef, Value};

const MAIN: &str = "main";
static HOOK_EVENTS: [(&str, &str); 3] = [("INSERT", "ins"), ("UPDATE", "upd"), ("DELETE", "del")];

/// SQLite database file.
///
/// SQLite only knows connection-wide foreign-key enforcement, so disabling a
/// table records it here and every connection opened while the set is
/// non-empty runs with `foreign_keys = OFF`.
pub struct SqliteEngine {
    path: PathBuf,
    timeout: Duration,
    suspended: Mutex<BTreeSet<TableRef>>,
}

trait StatementContext<T> {
    fn stmt(self, sql: &str) -> Result<T>;
}

impl<T> StatementContext<T> for rusqlite::Result<T> {
    fn stmt(self, sql: &str) -> Result<T> {
        self.map_err(|e| Error::engine(sql, e))
    }
}

impl SqliteEngine {
    pub fn open(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let engine = Self { path: path.into(), timeout, suspended: Mutex::new(BTreeSet::new()) };
        engine.connect()?;
        Ok(engine)
    }

    fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)
            .stmt(&format!("open {}", self.path.display()))?;
        conn.busy_timeout(self.timeout).stmt("busy_timeout")?;
        let enforce = self.suspended.lock().unwrap_or_else(PoisonError::into_inner).is_empty();
        let pragma = if enforce { "PRAGMA foreign_keys = ON" } else { "PRAGMA foreign_keys = OFF" };
        conn.execute_batch(pragma).stmt(pragma)?;
        Ok(conn)
    }

    fn scalar_i64(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<i64> {
        let conn = self.connect()?;
        conn.query_row(sql, args, |r| r.get(0)).stmt(sql)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(sql).stmt(sql)
    }

    /// Run a write inside an immediate transaction. With `tracking` set, the
    /// records `op` leaves in that store for `table` are removed before commit.
    fn quietly<F>(&self, table: &TableRef, tracking: Option<&TableRef>, op: F) -> Result<u64>
    where
        F: FnOnce(&Transaction<'_>) -> Result<u64>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .stmt("BEGIN IMMEDIATE")?;

        let mark = match tracking {
            Some(store) => {
                let sql = format!("SELECT coalesce(max(rowid), 0) FROM {}", qualified(store));
                let mark: i64 = tx.query_row(&sql, [], |r| r.get(0)).stmt(&sql)?;
                Some((store, mark))
            }
            None => None,
        };

        let count = op(&tx)?;

        if let Some((store, mark)) = mark {
            let sql = format!(
                "DELETE FROM {} WHERE rowid > ?1 AND \"TableSchema\" = ?2 AND \"TableName\" = ?3",
                qualified(store)
            );
            tx.execute(&sql, params![mark, table.schema, table.name]).stmt(&sql)?;
        }

        tx.commit().stmt("COMMIT")?;
        Ok(count)
    }

    fn hook_names(hook: &str) -> impl Iterator<Item = (&'static str, String)> + '_ {
        HOOK_EVENTS.iter().map(move |(event, tag)| (*event, format!("{}_{}", hook, tag)))
    }
}

impl Engine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn database(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn default_schema(&self) -> &str {
        MAIN
    }

    fn base_tables(&self) -> Result<Vec<TableRef>> {
        let sql = r"SELECT name FROM main.sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY name";
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).stmt(sql)?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .stmt(sql)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .stmt(sql)?;
        Ok(names.into_iter().map(|n| TableRef::new(MAIN, n)).collect())
    }

    fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            ident(&table.schema)
        );
        Ok(self.scalar_i64(&sql, &[&table.name])? > 0)
    }

    fn columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let sql = "SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid";
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).stmt(sql)?;
        let cols = stmt
            .query_map(params![table.name, table.schema], |r| r.get::<_, String>(0))
            .stmt(sql)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .stmt(sql)?;
        Ok(cols)
    }

    fn foreign_key_parents(&self, child: &TableRef) -> Result<Vec<TableRef>> {
        let sql = "SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?1, ?2) ORDER BY 1";
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).stmt(sql)?;
        let parents = stmt
            .query_map(params![child.name, child.schema], |r| r.get::<_, String>(0))
            .stmt(sql)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .stmt(sql)?;
        Ok(parents.into_iter().map(|p| TableRef::new(child.schema.clone(), p)).collect())
    }

    fn has_identity(&self, table: &TableRef) -> Result<bool> {
        let sql = format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            ident(&table.schema)
        );
        let conn = self.connect()?;
        let ddl: Option<Option<String>> = conn
            .query_row(&sql, [&table.name], |r| r.get(0))
            .optional()
            .stmt(&sql)?;
        Ok(ddl.flatten().is_some_and(|d| d.to_ascii_uppercase().contains("AUTOINCREMENT")))
    }

    fn reseed_identity(&self, table: &TableRef, seed: i64) -> Result<()> {
        let probe = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            ident(&table.schema)
        );
        if self.scalar_i64(&probe, &[])? == 0 {
            return Ok(());
        }
        let sql = format!("UPDATE {}.sqlite_sequence SET seq = ?1 WHERE name = ?2", ident(&table.schema));
        let conn = self.connect()?;
        conn.execute(&sql, params![seed, table.name]).stmt(&sql)?;
        Ok(())
    }

    fn recreate_tracking_store(&self, store: &TableRef) -> Result<()> {
        let q = qualified(store);
        self.execute_batch(&format!(
            "DROP TABLE IF EXISTS {q};
             CREATE TABLE {q} (\"TableSchema\" TEXT NOT NULL, \"TableName\" TEXT NOT NULL);"
        ))
    }

    fn tracked_tables(&self, store: &TableRef) -> Result<Vec<TableRef>> {
        let sql = format!(
            "SELECT DISTINCT \"TableSchema\", \"TableName\" FROM {} ORDER BY 1, 2",
            qualified(store)
        );
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql).stmt(&sql)?;
        let tables = stmt
            .query_map([], |r| Ok(TableRef::new(r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
            .stmt(&sql)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .stmt(&sql)?;
        Ok(tables)
    }

    fn clear_tracking(&self, store: &TableRef, table: Option<&TableRef>) -> Result<u64> {
        let conn = self.connect()?;
        let removed = match table {
            None => {
                let sql = format!("DELETE FROM {}", qualified(store));
                conn.execute(&sql, []).stmt(&sql)?
            }
            Some(t) => {
                let sql = format!(
                    "DELETE FROM {} WHERE \"TableSchema\" = ?1 AND \"TableName\" = ?2",
                    qualified(store)
                );
                conn.execute(&sql, params![t.schema, t.name]).stmt(&sql)?
            }
        };
        Ok(removed as u64)
    }

    fn install_mutation_hook(&self, table: &TableRef, hook: &str, store: &TableRef) -> Result<()> {
        if store.schema != table.schema {
            return Err(Error::Config(format!(
                "sqlite triggers cannot write across schemas ({} -> {})",
                table, store
            )));
        }
        let mut sql = String::new();
        for (event, name) in Self::hook_names(hook) {
            sql.push_str(&format!(
                "CREATE TRIGGER {schema}.{trigger} AFTER {event} ON {table}
                 WHEN NOT EXISTS (SELECT 1 FROM {store} WHERE \"TableSchema\" = {ls} AND \"TableName\" = {ln})
                 BEGIN
                     INSERT INTO {store} (\"TableSchema\", \"TableName\") VALUES ({ls}, {ln});
                 END;\n",
                schema = ident(&table.schema),
                trigger = ident(&name),
                table = ident(&table.name),
                store = ident(&store.name),
                ls = literal(&table.schema),
                ln = literal(&table.name),
            ));
        }
        self.execute_batch(&sql)
    }

    fn drop_mutation_hook(&self, table: &TableRef, hook: &str) -> Result<()> {
        let sql: String = Self::hook_names(hook)
            .map(|(_, name)| format!("DROP TRIGGER IF EXISTS {}.{};\n", ident(&table.schema), ident(&name)))
            .collect();
        self.execute_batch(&sql)
    }

    fn mutation_hook_exists(&self, table: &TableRef, hook: &str) -> Result<bool> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master
             WHERE type = 'trigger' AND tbl_name = ?1 AND name IN (?2, ?3, ?4)",
            ident(&table.schema)
        );
        let names: Vec<String> = Self::hook_names(hook).map(|(_, n)| n).collect();
        let found = self.scalar_i64(&sql, &[&table.name, &names[0], &names[1], &names[2]])?;
        Ok(found as usize == HOOK_EVENTS.len())
    }

    fn drop_table(&self, table: &TableRef) -> Result<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {}", qualified(table)))
    }

    fn clone_shape(&self, source: &TableRef, dest: &TableRef) -> Result<()> {
        let create = format!(
            "CREATE TABLE {} AS SELECT * FROM {} WHERE 0",
            qualified(dest),
            qualified(source)
        );
        if !self.table_exists(dest)? {
            return self.execute_batch(&create);
        }
        if self.columns(source)? == self.columns(dest)? {
            return self.execute_batch(&format!("DELETE FROM {}", qualified(dest)));
        }
        tracing::warn!(table = %source, "baseline shape drifted; rebuilding {}", dest);
        self.quietly(dest, None, |tx| {
            let drop = format!("DROP TABLE {}", qualified(dest));
            tx.execute_batch(&drop).stmt(&drop)?;
            tx.execute_batch(&create).stmt(&create)?;
            Ok(0)
        })
        .map(|_| ())
    }

    fn delete_rows(&self, table: &TableRef, tracking: Option<&TableRef>) -> Result<u64> {
        self.quietly(table, tracking, |tx| {
            let sql = format!("DELETE FROM {}", qualified(table));
            Ok(tx.execute(&sql, []).stmt(&sql)? as u64)
        })
    }

    fn copy_rows(&self, source: &TableRef, dest: &TableRef, tracking: Option<&TableRef>) -> Result<u64> {
        self.quietly(dest, tracking, |tx| {
            let sql = format!("INSERT INTO {} SELECT * FROM {}", qualified(dest), qualified(source));
            Ok(tx.execute(&sql, []).stmt(&sql)? as u64)
        })
    }

    fn export_rows(&self, table: &TableRef, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64> {
        let sql = format!("SELECT * FROM {}", qualified(table));
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql).stmt(&sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query([]).stmt(&sql)?;
        let mut count = 0u64;
        while let Some(row) = rows.next().stmt(&sql)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sql(row.get_ref(i).stmt(&sql)?));
            }
            sink(values)?;
            count += 1;
        }
        Ok(count)
    }

    fn import_rows(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &mut dyn Iterator<Item = Result<Row>>,
        tracking: Option<&TableRef>,
    ) -> Result<u64> {
        let names = columns.iter().map(|c| ident(c)).collect::<Vec<_>>().join(", ");
        let marks = (1..=columns.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES ({})", qualified(table), names, marks);

        self.quietly(table, tracking, |tx| {
            let mut stmt = tx.prepare(&sql).stmt(&sql)?;
            let mut count = 0u64;
            for row in rows {
                let row = row?;
                if row.len() != columns.len() {
                    return Err(Error::snapshot(
                        table,
                        format!("row has {} values, expected {}", row.len(), columns.len()),
                    ));
                }
                stmt.execute(params_from_iter(row.iter().map(to_sql))).stmt(&sql)?;
                count += 1;
            }
            Ok(count)
        })
    }

    fn disable_foreign_keys(&self, table: &TableRef) -> Result<()> {
        self.suspended.lock().unwrap_or_else(PoisonError::into_inner).insert(table.clone());
        Ok(())
    }

    fn enable_foreign_keys(&self, table: &TableRef) -> Result<()> {
        self.suspended.lock().unwrap_or_else(PoisonError::into_inner).remove(table);
        Ok(())
    }

    fn foreign_keys_enabled(&self, table: &TableRef) -> Result<bool> {
        Ok(!self.suspended.lock().unwrap_or_else(PoisonError::into_inner).contains(table))
    }
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", ident(&table.schema), ident(&table.name))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => match std::str::from_utf8(t) {
            Ok(text) => Value::Text(text.to_owned()),
            Err(_) => Value::TextBytes(t.to_vec()),
        },
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn to_sql(value: &Value) -> ToSqlOutput<'_> {
    match value {
        Value::Null => ToSqlOutput::Owned(SqlValue::Null),
        Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
        Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
        Value::Text(t) => ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes())),
        // Bound as TEXT with the original bytes.
        Value::TextBytes(b) => ToSqlOutput::Borrowed(ValueRef::Text(b)),
        Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
    }
}
