use crate::job_index::JobIndexStore;
use crate::server::metrics;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

pub const DEFAULT_RETENTION_DAYS: i64 = 60;

/// Non-positive values fall back to the default.
pub fn effective_retention_days(days: i64) -> i64 {
    if days <= 0 {
        DEFAULT_RETENTION_DAYS
    } else {
        days
    }
}

/// Cutoff `retention_days` before `now`, or `None` when it falls outside the
/// representable range.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(retention_days).and_then(|retention| now.checked_sub_signed(retention))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobIndexCleanupResult {
    pub deleted_count: usize,
    pub retention_days: i64,
}

/// Bounds the job index by deleting old terminal rows.
pub struct JobIndexCleanupService {
    store: Arc<dyn JobIndexStore>,
    retention_days: i64,
}

impl JobIndexCleanupService {
    pub fn new(store: Arc<dyn JobIndexStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Scheduled cleanup using the configured retention.
    pub fn cleanup_old_job_indices(&self) -> Result<usize> {
        self.cleanup_job_indices(None)
            .map(|result| result.deleted_count)
    }

    /// Cleanup with an optional retention override.
    pub fn cleanup_job_indices(&self, retention_days: Option<i64>) -> Result<JobIndexCleanupResult> {
        let retention_days =
            effective_retention_days(retention_days.unwrap_or(self.retention_days));
        let cutoff = retention_cutoff(Utc::now(), retention_days)
            .ok_or_else(|| anyhow!("Retention of {} days is out of range", retention_days))?;

        let deleted_count = self
            .store
            .delete_terminal_before(cutoff)
            .with_context(|| format!("Failed to delete job index rows older than {}", cutoff))
            .inspect_err(|e| error!("Job index cleanup failed: {:#}", e))?;

        metrics::record_job_index_rows_deleted("retention", deleted_count);
        info!(
            "Job index cleanup removed {} terminal rows older than {} days",
            deleted_count, retention_days
        );
        Ok(JobIndexCleanupResult {
            deleted_count,
            retention_days,
        })
    }
}
