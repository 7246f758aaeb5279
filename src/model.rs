use serde::{Deserialize, Serialize};
use std::fmt;

/// One base table, `{database?, schema, name}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { database: None, schema: schema.into(), name: name.into() }
    }

    /// Same schema, name with `suffix` appended.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: format!("{}{}", self.name, suffix),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(db) => write!(f, "{}.{}.{}", db, self.schema, self.name),
            None => write!(f, "{}.{}", self.schema, self.name),
        }
    }
}

/// A single column value as it travels between a live table and a flat-file baseline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// TEXT whose bytes are not valid UTF-8, kept as stored.
    TextBytes(Vec<u8>),
    Blob(Vec<u8>),
}

pub type Row = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    ToSnapshot,
    FromSnapshot,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToSnapshot => f.write_str("snapshot"),
            Direction::FromSnapshot => f.write_str("restore"),
        }
    }
}

/// Names of every object the tracking and snapshot machinery places in a database.
#[derive(Debug, Clone)]
pub struct Naming {
    pub tracking_store: String,
    pub snapshot_suffix: String,
    pub legacy_sentinels: Vec<String>,
    pub hook_prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            tracking_store: "df_ChangeTracking".into(),
            snapshot_suffix: "__backup".into(),
            legacy_sentinels: vec!["dr_DeltaVersion".into()],
            hook_prefix: "trig_df_ChangeTracking_".into(),
        }
    }
}

impl Naming {
    pub fn tracking_store_in(&self, schema: &str) -> TableRef {
        TableRef::new(schema, self.tracking_store.clone())
    }

    pub fn hook_for(&self, table: &TableRef) -> String {
        format!("{}{}", self.hook_prefix, table.name)
    }

    pub fn snapshot_of(&self, table: &TableRef) -> TableRef {
        table.with_suffix(&self.snapshot_suffix)
    }

    pub fn is_snapshot_name(&self, name: &str) -> bool {
        name.ends_with(&self.snapshot_suffix)
    }

    /// True for names that are bookkeeping rather than user data.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.tracking_store
            || self.legacy_sentinels.iter().any(|s| s == name)
            || self.is_snapshot_name(name)
    }
}
