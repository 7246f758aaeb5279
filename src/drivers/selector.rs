use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{Engine, sqlite::SqliteEngine};
use crate::error::{Error, Result};

pub fn open_engine(target: &str, timeout: Duration) -> Result<Arc<dyn Engine>> {
    if let Some(path) = target.strip_prefix("sqlite://") {
        return Ok(Arc::new(SqliteEngine::open(path, timeout)?));
    }

    if target.starts_with("postgres://") || target.starts_with("postgresql://") || target.starts_with("mysql://") {
        return Err(Error::Config(format!("no engine driver for target '{}'", target)));
    }

    let is_sqlite_file = Path::new(target)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "sqlite" | "sqlite3" | "db"));
    if is_sqlite_file {
        return Ok(Arc::new(SqliteEngine::open(target, timeout)?));
    }

    Err(Error::Config(format!("unrecognised target '{}'", target)))
}
