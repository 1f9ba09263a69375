//! ==============================================================================
//! retention.rs - bounded storage
//! ==============================================================================
//!
//! purpose:
//!     once the database grows past `size_threshold`, every reading older
//!     than `max_age` is deleted from all three series.
//!
//! rules:
//!     - size cannot be measured -> nothing is deleted, error is returned
//!     - below threshold -> nothing is deleted
//!     - readings with timestamp >= now - max_age are never touched
//!     - the delete covers all series in one transaction (see store/)
//!
//! relationships:
//!     - uses: store/ (current_size, purge_older_than)
//!     - started by: main.rs (spawn_retention)
//!
//! ==============================================================================

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::size::ByteSize;
use crate::store::{PurgeCounts, ReadingStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    pub size_threshold: ByteSize,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            size_threshold: ByteSize::mb(650),
            max_age: Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetentionOutcome {
    BelowThreshold {
        size: ByteSize,
    },
    Purged {
        size: ByteSize,
        cutoff: DateTime<Utc>,
        deleted: PurgeCounts,
    },
}

impl RetentionOutcome {
    pub fn total_deleted(&self) -> u64 {
        match self {
            RetentionOutcome::BelowThreshold { .. } => 0,
            RetentionOutcome::Purged { deleted, .. } => deleted.values().sum(),
        }
    }
}

pub async fn enforce<S>(
    store: &S,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<RetentionOutcome, AppError>
where
    S: ReadingStore + ?Sized,
{
    let size = store.current_size().await?;
    if size < policy.size_threshold {
        tracing::debug!(%size, threshold = %policy.size_threshold, "database below retention threshold");
        return Ok(RetentionOutcome::BelowThreshold { size });
    }

    let cutoff = now - policy.max_age;
    tracing::info!(%size, threshold = %policy.size_threshold, %cutoff, "database over threshold, purging old readings");
    let deleted = store.purge_older_than(cutoff).await?;
    Ok(RetentionOutcome::Purged { size, cutoff, deleted })
}

// ==============================================================================
// background task
// ==============================================================================

/// checks once right away, then every `every`, until shutdown
pub fn spawn_retention(
    store: Arc<dyn ReadingStore>,
    policy: RetentionPolicy,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval = ?every,
            threshold = %policy.size_threshold,
            max_age_days = policy.max_age.num_days(),
            "retention task started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match enforce(store.as_ref(), &policy, Utc::now()).await {
                        Ok(outcome) => {
                            if let RetentionOutcome::Purged { size, cutoff, .. } = &outcome {
                                tracing::info!(
                                    %size,
                                    %cutoff,
                                    deleted = outcome.total_deleted(),
                                    "retention purge complete"
                                );
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "retention check failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("retention task stopped");
    })
}
