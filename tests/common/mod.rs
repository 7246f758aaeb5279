// Shared fixtures for the integration tests: a small shop schema in a
// throwaway SQLite file, plus helpers to inspect it through a plain connection.
#![allow(dead_code)]

use datafresh::{DataFresh, DataFreshConfig, StorageKind};
use rusqlite::Connection;
use rusqlite::types::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SHOP_SCHEMA: &str = "
    CREATE TABLE Customers (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        Name TEXT NOT NULL,
        Photo BLOB,
        Score REAL
    );
    CREATE TABLE Orders (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        CustomerId INTEGER NOT NULL REFERENCES Customers(Id),
        Total REAL
    );
    CREATE TABLE Regions (
        Code TEXT PRIMARY KEY,
        Label TEXT
    );
    INSERT INTO Customers (Name, Photo, Score) VALUES ('Ada', x'00ff10', 0.1);
    INSERT INTO Customers (Name, Photo, Score) VALUES ('Grace', NULL, 1e308);
    INSERT INTO Orders (CustomerId, Total) VALUES (1, 10.5);
    INSERT INTO Orders (CustomerId, Total) VALUES (1, 20.25);
    INSERT INTO Orders (CustomerId, Total) VALUES (2, NULL);
    INSERT INTO Regions (Code, Label) VALUES ('EU', 'Europe');
    INSERT INTO Regions (Code, Label) VALUES ('NA', 'North America');
";

pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn with_schema(schema: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.db");
        let conn = Connection::open(&path).expect("create db");
        conn.execute_batch(schema).expect("apply schema");
        Self { dir, path }
    }

    pub fn shop() -> Self {
        Self::with_schema(SHOP_SCHEMA)
    }

    pub fn config(&self) -> DataFreshConfig {
        let mut cfg = DataFreshConfig::new(self.path.display().to_string());
        cfg.workers = Some(2);
        cfg.batch_size = 2;
        cfg
    }

    pub fn flat_file_config(&self) -> DataFreshConfig {
        let mut cfg = self.config();
        cfg.storage = StorageKind::FlatFile;
        cfg.snapshot_root = Some(self.snapshot_root());
        cfg
    }

    pub fn snapshot_root(&self) -> PathBuf {
        self.dir.path().join("baseline")
    }

    pub fn fresh(&self) -> DataFresh {
        DataFresh::open(self.config()).expect("open datafresh")
    }

    pub fn conn(&self) -> Connection {
        let conn = Connection::open(&self.path).expect("open db");
        conn.execute_batch("PRAGMA foreign_keys = ON").expect("foreign keys");
        conn
    }

    pub fn exec(&self, sql: &str) {
        self.conn().execute_batch(sql).expect(sql);
    }

    pub fn dump(&self, table: &str) -> Vec<Vec<Value>> {
        dump(&self.path, table)
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.conn().query_row(sql, [], |r| r.get(0)).expect(sql)
    }

    pub fn tracking_rows(&self) -> i64 {
        self.count("SELECT count(*) FROM df_ChangeTracking")
    }

    pub fn table_names(&self) -> Vec<String> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect()
    }

    pub fn trigger_names(&self) -> Vec<String> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'trigger' ORDER BY name")
            .unwrap();
        stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect()
    }
}

pub fn dump(path: &Path, table: &str) -> Vec<Vec<Value>> {
    let conn = Connection::open(path).expect("open db");
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\" ORDER BY rowid", table)).unwrap();
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |r| (0..width).map(|i| r.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<_>>>())
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

pub fn names(tables: &[datafresh::TableRef]) -> Vec<&str> {
    tables.iter().map(|t| t.name.as_str()).collect()
}
