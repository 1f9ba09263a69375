//! ==============================================================================
//! store - persistence for the three reading series
//! ==============================================================================
//!
//! purpose:
//!     one trait, two backends, picked by `[database] backend`:
//!     - postgres.rs: the real thing (sqlx pool)
//!     - memory.rs: in-process tables for running without a database
//!       and for tests
//!
//! guarantees every backend provides:
//!     - `insert` writes all given rows or none of them
//!     - `purge_older_than` deletes from all three series in one transaction
//!
//! ==============================================================================

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Metric, Reading, SortOrder};
use crate::error::AppError;
use crate::size::ByteSize;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// rows removed per series by one purge
pub type PurgeCounts = BTreeMap<Metric, u64>;

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// create tables/indexes if the backend needs them
    async fn ensure_schema(&self) -> Result<(), AppError>;

    /// append one row per `(metric, value)`, all stamped with `at`
    async fn insert(&self, at: DateTime<Utc>, values: &[(Metric, f64)]) -> Result<(), AppError>;

    async fn series(&self, metric: Metric, order: SortOrder) -> Result<Vec<Reading>, AppError>;

    /// total storage footprint
    async fn current_size(&self) -> Result<ByteSize, AppError>;

    /// delete every reading with `timestamp < cutoff` from every series
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, AppError>;
}
