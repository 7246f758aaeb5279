use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use super::SnapshotStore;
use crate::drivers::Engine;
use crate::error::{Error, Result};
use crate::model::{Naming, Row, TableRef, Value};
use crate::transfer::{BulkTransfer, TableTransfer, each_table};
use crate::utils::hash::{HashingWriter, sha256_file};

/// Baselines exported to `<root>/<schema>.<table>.jsonl`, one JSON array per row,
/// described by a `<schema>.<table>.meta.json` sidecar written last.
pub struct FlatFiles {
    engine: Arc<dyn Engine>,
    root: PathBuf,
    tracking: TableRef,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EntryMeta {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub rows: u64,
    pub sha256: String,
    pub captured_at: DateTime<Local>,
}

/// On-disk cell. Reals keep their bit pattern; blobs and non-UTF-8 text are hex.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum StoredValue {
    Null,
    Integer(i64),
    Real(u64),
    Text(String),
    TextBytes(String),
    Blob(String),
}

impl From<Value> for StoredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StoredValue::Null,
            Value::Integer(i) => StoredValue::Integer(i),
            Value::Real(f) => StoredValue::Real(f.to_bits()),
            Value::Text(t) => StoredValue::Text(t),
            Value::TextBytes(b) => StoredValue::TextBytes(hex::encode(b)),
            Value::Blob(b) => StoredValue::Blob(hex::encode(b)),
        }
    }
}

impl StoredValue {
    fn into_value(self) -> std::result::Result<Value, hex::FromHexError> {
        Ok(match self {
            StoredValue::Null => Value::Null,
            StoredValue::Integer(i) => Value::Integer(i),
            StoredValue::Real(bits) => Value::Real(f64::from_bits(bits)),
            StoredValue::Text(t) => Value::Text(t),
            StoredValue::TextBytes(h) => Value::TextBytes(hex::decode(h)?),
            StoredValue::Blob(h) => Value::Blob(hex::decode(h)?),
        })
    }
}

impl FlatFiles {
    pub fn new(engine: Arc<dyn Engine>, naming: &Naming, root: PathBuf) -> Self {
        let tracking = naming.tracking_store_in(engine.default_schema());
        Self { engine, root, tracking }
    }

    /// `<schema>.<name>`, each part escaped so distinct tables never share a file.
    fn stem(table: &TableRef) -> String {
        format!("{}.{}", escape_name(&table.schema), escape_name(&table.name))
    }

    pub fn data_path(&self, table: &TableRef) -> PathBuf {
        self.root.join(format!("{}.jsonl", Self::stem(table)))
    }

    pub fn meta_path(&self, table: &TableRef) -> PathBuf {
        self.root.join(format!("{}.meta.json", Self::stem(table)))
    }

    pub fn load_meta(&self, table: &TableRef) -> Result<Option<EntryMeta>> {
        let path = self.meta_path(table);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn export(&self, table: &TableRef) -> Result<u64> {
        let columns = self.engine.columns(table)?;
        let data_path = self.data_path(table);
        let file = File::create(&data_path).map_err(|e| Error::io(&data_path, e))?;
        let mut writer = HashingWriter::new(BufWriter::new(file));

        let rows = self.engine.export_rows(table, &mut |row: Row| -> Result<()> {
            let stored: Vec<StoredValue> = row.into_iter().map(StoredValue::from).collect();
            serde_json::to_writer(&mut writer, &stored)?;
            writer.write_all(b"\n").map_err(|e| Error::io(&data_path, e))
        })?;

        let (sha256, mut inner) = writer.finish();
        inner.flush().map_err(|e| Error::io(&data_path, e))?;

        let meta = EntryMeta { table: table.clone(), columns, rows, sha256, captured_at: Local::now() };
        let meta_path = self.meta_path(table);
        fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).map_err(|e| Error::io(&meta_path, e))?;
        Ok(rows)
    }

    fn restore(&self, table: &TableRef) -> Result<u64> {
        let meta = self
            .load_meta(table)?
            .ok_or_else(|| Error::snapshot(table, format!("no baseline at {}", self.location(table))))?;
        if meta.table != *table {
            return Err(Error::snapshot(
                table,
                format!("baseline at {} belongs to {}", self.location(table), meta.table),
            ));
        }

        let live = self.engine.columns(table)?;
        if live != meta.columns {
            return Err(Error::snapshot(
                table,
                format!("shape mismatch: live {:?}, baseline {:?}", live, meta.columns),
            ));
        }

        let data_path = self.data_path(table);
        let digest = sha256_file(&data_path).map_err(|e| Error::io(&data_path, e))?;
        if digest != meta.sha256 {
            return Err(Error::snapshot(table, "baseline checksum mismatch"));
        }

        let file = File::open(&data_path).map_err(|e| Error::io(&data_path, e))?;
        let mut rows = BufReader::new(file).lines().map(|line| -> Result<Row> {
            let line = line.map_err(|e| Error::io(&data_path, e))?;
            let stored: Vec<StoredValue> = serde_json::from_str(&line)?;
            stored
                .into_iter()
                .map(|v| v.into_value().map_err(|e| Error::snapshot(table, format!("bad hex cell: {e}"))))
                .collect()
        });

        let loaded = self.engine.import_rows(table, &meta.columns, &mut rows, Some(&self.tracking))?;
        if loaded != meta.rows {
            return Err(Error::snapshot(
                table,
                format!("loaded {} rows, baseline recorded {}", loaded, meta.rows),
            ));
        }
        Ok(loaded)
    }
}

impl SnapshotStore for FlatFiles {
    fn prepare_entry(&self, table: &TableRef) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        self.drop_entry(table)
    }

    fn entry_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.meta_path(table).is_file())
    }

    fn drop_entry(&self, table: &TableRef) -> Result<()> {
        // Sidecar first so a half-removed entry never looks complete.
        for path in [self.meta_path(table), self.data_path(table)] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            }
        }
        Ok(())
    }

    fn location(&self, table: &TableRef) -> String {
        self.data_path(table).display().to_string()
    }
}

impl BulkTransfer for FlatFiles {
    fn name(&self) -> &'static str {
        "flat-file"
    }

    fn to_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
        Ok(each_table(batch, |t| self.export(t)))
    }

    fn from_snapshot(&self, batch: &[TableRef]) -> Result<Vec<TableTransfer>> {
        Ok(each_table(batch, |t| self.restore(t)))
    }
}

/// Keep ASCII alphanumerics and `-`; every other byte, `_` included, becomes `_XX`.
fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02X}", b));
        }
    }
    out
}
