use std::path::PathBuf;
use thiserror::Error;

use crate::model::{Direction, TableRef};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("DataFresh table ({object}) not found. Please prepare the database.")]
    NotPrepared { object: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{direction} incomplete: {} of {attempted} table(s) failed", failed.len())]
    Transfer {
        direction: Direction,
        attempted: usize,
        failed: Vec<(TableRef, String)>,
    },

    #[error("statement failed: {statement}: {source}")]
    Engine {
        statement: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("snapshot of {table}: {message}")]
    Snapshot { table: TableRef, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn engine(
        statement: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Engine { statement: statement.into(), source: Box::new(source) }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub fn snapshot(table: &TableRef, message: impl Into<String>) -> Self {
        Error::Snapshot { table: table.clone(), message: message.into() }
    }
}
