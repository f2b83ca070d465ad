//! Retention sweep
//!
//! Postings older than the horizon (by `posted_at`, else `created_at`) are
//! deleted. Submission snapshots are kept.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::db;

/// Days a posting is kept
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

pub struct RetentionSweep {
    db: SqlitePool,
    retention_days: u32,
}

impl RetentionSweep {
    pub fn new(db: SqlitePool, retention_days: u32) -> Self {
        Self { db, retention_days }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }

    /// Postings the next sweep would delete
    pub async fn count_stale(&self) -> hjf_common::Result<u64> {
        db::jobs::count_older_than(&self.db, self.cutoff(Utc::now())).await
    }

    pub async fn sweep(&self) -> hjf_common::Result<u64> {
        let cutoff = self.cutoff(Utc::now());
        let deleted = db::jobs::delete_older_than(&self.db, cutoff).await?;
        info!(deleted, retention_days = self.retention_days, %cutoff, "Retention sweep complete");
        Ok(deleted)
    }
}
