//! in-process backend. same contract as postgres, nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{PurgeCounts, ReadingStore};
use crate::domain::{Metric, Reading, SortOrder};
use crate::error::AppError;
use crate::size::ByteSize;

/// rough per-row footprint used for the size estimate (timestamp + f64)
const ROW_BYTES: u64 = 16;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Metric, Vec<Reading>>>,
    reported_size: RwLock<Option<ByteSize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// pin what `current_size` reports instead of estimating from row count
    #[cfg(test)]
    pub fn set_reported_size(&self, size: Option<ByteSize>) {
        *self.reported_size.write() = size;
    }

    #[cfg(test)]
    pub fn len(&self, metric: Metric) -> usize {
        self.tables.read().get(&metric).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert(&self, at: DateTime<Utc>, values: &[(Metric, f64)]) -> Result<(), AppError> {
        // single write lock, so the rows land together
        let mut tables = self.tables.write();
        for &(metric, value) in values {
            tables.entry(metric).or_default().push(Reading::new(at, value));
        }
        Ok(())
    }

    async fn series(&self, metric: Metric, order: SortOrder) -> Result<Vec<Reading>, AppError> {
        let mut rows = self.tables.read().get(&metric).cloned().unwrap_or_default();
        // stable sort keeps insertion order for equal timestamps
        match order {
            SortOrder::Ascending => rows.sort_by_key(|r| r.timestamp),
            SortOrder::Descending => rows.sort_by_key(|r| std::cmp::Reverse(r.timestamp)),
        }
        Ok(rows)
    }

    async fn current_size(&self) -> Result<ByteSize, AppError> {
        if let Some(size) = *self.reported_size.read() {
            return Ok(size);
        }
        let rows: usize = self.tables.read().values().map(Vec::len).sum();
        Ok(ByteSize::bytes(rows as u64 * ROW_BYTES))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, AppError> {
        let mut tables = self.tables.write();
        let mut counts = PurgeCounts::new();
        for metric in Metric::ALL {
            let rows = tables.entry(metric).or_default();
            let before = rows.len();
            rows.retain(|r| r.timestamp >= cutoff);
            counts.insert(metric, (before - rows.len()) as u64);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn paired_insert_shares_timestamp() {
        let store = MemoryStore::new();
        store
            .insert(t0(), &[(Metric::Temperature, 22.5), (Metric::Humidity, 60.0)])
            .await
            .unwrap();

        let temps = store.series(Metric::Temperature, SortOrder::Ascending).await.unwrap();
        let hums = store.series(Metric::Humidity, SortOrder::Ascending).await.unwrap();
        assert_eq!(temps, vec![Reading::new(t0(), 22.5)]);
        assert_eq!(hums, vec![Reading::new(t0(), 60.0)]);
        assert_eq!(store.len(Metric::Mq6), 0);
    }

    #[tokio::test]
    async fn series_ordering() {
        let store = MemoryStore::new();
        for i in [2, 0, 1] {
            store.insert(t0() + Duration::seconds(i), &[(Metric::Mq6, i as f64)]).await.unwrap();
        }
        let asc = store.series(Metric::Mq6, SortOrder::Ascending).await.unwrap();
        let desc = store.series(Metric::Mq6, SortOrder::Descending).await.unwrap();
        assert_eq!(asc.iter().map(|r| r.value).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
        assert_eq!(desc.iter().map(|r| r.value).collect::<Vec<_>>(), vec![2.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn size_is_estimated_unless_pinned() {
        let store = MemoryStore::new();
        store.insert(t0(), &[(Metric::Mq6, 1.0)]).await.unwrap();
        assert_eq!(store.current_size().await.unwrap(), ByteSize::bytes(ROW_BYTES));

        store.set_reported_size(Some(ByteSize::mb(700)));
        assert_eq!(store.current_size().await.unwrap(), ByteSize::mb(700));
    }

    #[tokio::test]
    async fn purge_keeps_rows_at_or_after_cutoff() {
        let store = MemoryStore::new();
        store.insert(t0() - Duration::seconds(1), &[(Metric::Humidity, 1.0)]).await.unwrap();
        store.insert(t0(), &[(Metric::Humidity, 2.0)]).await.unwrap();

        let counts = store.purge_older_than(t0()).await.unwrap();
        assert_eq!(counts[&Metric::Humidity], 1);
        assert_eq!(counts[&Metric::Temperature], 0);
        let left = store.series(Metric::Humidity, SortOrder::Ascending).await.unwrap();
        assert_eq!(left, vec![Reading::new(t0(), 2.0)]);
    }
}
