//! ==============================================================================
//! postgres.rs - sqlx backed reading store
//! ==============================================================================
//!
//! tables (one per series, append-only):
//!
//!     temperature_data (timestamp TIMESTAMPTZ, temperature DOUBLE PRECISION)
//!     humidity_data    (timestamp TIMESTAMPTZ, humidity    DOUBLE PRECISION)
//!     mq6_data         (timestamp TIMESTAMPTZ, mq6_reading DOUBLE PRECISION)
//!
//! the pool connects lazily: the hub starts even while postgres is down and
//! every request then fails with a connection error until it comes back.
//!
//! ==============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::{PurgeCounts, ReadingStore};
use crate::config::DatabaseConfig;
use crate::domain::{Metric, Reading, SortOrder};
use crate::error::AppError;
use crate::size::ByteSize;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_lazy_with(options);

        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// statements are fixed per metric; table/column names never come from input

fn create_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => {
            "CREATE TABLE IF NOT EXISTS temperature_data (\
                 timestamp TIMESTAMPTZ NOT NULL, temperature DOUBLE PRECISION NOT NULL)"
        }
        Metric::Humidity => {
            "CREATE TABLE IF NOT EXISTS humidity_data (\
                 timestamp TIMESTAMPTZ NOT NULL, humidity DOUBLE PRECISION NOT NULL)"
        }
        Metric::Mq6 => {
            "CREATE TABLE IF NOT EXISTS mq6_data (\
                 timestamp TIMESTAMPTZ NOT NULL, mq6_reading DOUBLE PRECISION NOT NULL)"
        }
    }
}

fn index_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => {
            "CREATE INDEX IF NOT EXISTS temperature_data_timestamp_idx ON temperature_data (timestamp)"
        }
        Metric::Humidity => {
            "CREATE INDEX IF NOT EXISTS humidity_data_timestamp_idx ON humidity_data (timestamp)"
        }
        Metric::Mq6 => "CREATE INDEX IF NOT EXISTS mq6_data_timestamp_idx ON mq6_data (timestamp)",
    }
}

fn insert_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => "INSERT INTO temperature_data (timestamp, temperature) VALUES ($1, $2)",
        Metric::Humidity => "INSERT INTO humidity_data (timestamp, humidity) VALUES ($1, $2)",
        Metric::Mq6 => "INSERT INTO mq6_data (timestamp, mq6_reading) VALUES ($1, $2)",
    }
}

fn select_sql(metric: Metric, order: SortOrder) -> &'static str {
    match (metric, order) {
        (Metric::Temperature, SortOrder::Ascending) => {
            "SELECT timestamp, temperature FROM temperature_data ORDER BY timestamp ASC"
        }
        (Metric::Temperature, SortOrder::Descending) => {
            "SELECT timestamp, temperature FROM temperature_data ORDER BY timestamp DESC"
        }
        (Metric::Humidity, SortOrder::Ascending) => {
            "SELECT timestamp, humidity FROM humidity_data ORDER BY timestamp ASC"
        }
        (Metric::Humidity, SortOrder::Descending) => {
            "SELECT timestamp, humidity FROM humidity_data ORDER BY timestamp DESC"
        }
        (Metric::Mq6, SortOrder::Ascending) => {
            "SELECT timestamp, mq6_reading FROM mq6_data ORDER BY timestamp ASC"
        }
        (Metric::Mq6, SortOrder::Descending) => {
            "SELECT timestamp, mq6_reading FROM mq6_data ORDER BY timestamp DESC"
        }
    }
}

fn delete_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature => "DELETE FROM temperature_data WHERE timestamp < $1",
        Metric::Humidity => "DELETE FROM humidity_data WHERE timestamp < $1",
        Metric::Mq6 => "DELETE FROM mq6_data WHERE timestamp < $1",
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for metric in Metric::ALL {
            sqlx::query(create_sql(metric)).execute(&mut *tx).await?;
            sqlx::query(index_sql(metric)).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!("database schema ready");
        Ok(())
    }

    async fn insert(&self, at: DateTime<Utc>, values: &[(Metric, f64)]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for &(metric, value) in values {
            sqlx::query(insert_sql(metric))
                .bind(at)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn series(&self, metric: Metric, order: SortOrder) -> Result<Vec<Reading>, AppError> {
        let rows: Vec<(DateTime<Utc>, f64)> = sqlx::query_as(select_sql(metric, order))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(ts, v)| Reading::new(ts, v)).collect())
    }

    async fn current_size(&self) -> Result<ByteSize, AppError> {
        let bytes: i64 = sqlx::query_scalar("SELECT pg_database_size(current_database())")
            .fetch_one(&self.pool)
            .await?;
        Ok(ByteSize::bytes(bytes.max(0) as u64))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, AppError> {
        // one transaction: either every series is trimmed or none is
        let mut tx = self.pool.begin().await?;
        let mut counts = PurgeCounts::new();
        for metric in Metric::ALL {
            let result = sqlx::query(delete_sql(metric))
                .bind(cutoff)
                .execute(&mut *tx)
                .await?;
            counts.insert(metric, result.rows_affected());
        }
        tx.commit().await?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_target_the_metric_table() {
        for metric in Metric::ALL {
            assert!(insert_sql(metric).contains(metric.table()));
            assert!(insert_sql(metric).contains(metric.column()));
            assert!(delete_sql(metric).contains(metric.table()));
            assert!(create_sql(metric).contains(metric.column()));
            assert!(index_sql(metric).contains(metric.table()));
            assert!(select_sql(metric, SortOrder::Ascending).ends_with("ASC"));
            assert!(select_sql(metric, SortOrder::Descending).ends_with("DESC"));
        }
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connection_error() {
        let config = DatabaseConfig {
            host: "127.0.0.1".into(),
            port: 1,
            acquire_timeout_seconds: 1,
            ..DatabaseConfig::default()
        };
        let store = PgStore::connect_lazy(&config);
        let err = store.current_size().await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)), "got {err:?}");
    }
}
