//! Reset a relational database to a captured baseline between test runs.
//!
//! Tables are instrumented with mutation hooks that record which tables a test
//! touched; a refresh restores only those tables from their baseline, with
//! foreign-key enforcement suspended around the reload.
//!
//! ```no_run
//! use datafresh::{DataFresh, DataFreshConfig};
//!
//! # fn main() -> datafresh::Result<()> {
//! let fresh = DataFresh::open(DataFreshConfig::new("sqlite://app.db"))?;
//! fresh.prepare(true)?;
//! // ... run a test that writes to the database ...
//! if fresh.has_database_been_modified()? {
//!     fresh.refresh()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod drivers;
pub mod error;
pub mod integrity;
pub mod model;
pub mod refresh;
pub mod snapshot;
pub mod tracking;
pub mod transfer;
mod utils;

pub use config::{DataFreshConfig, ReferenceClosure, StorageKind};
pub use error::{Error, Result};
pub use model::{Direction, Naming, TableRef, Value};
pub use refresh::{DataFresh, RefreshSummary};
pub use tracking::PreparedState;
pub use transfer::TransferReport;
