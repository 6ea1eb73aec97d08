//! Queryable mirror of engine jobs keyed by dataset.

mod enqueuer;
mod models;
mod schema;
mod sqlite_job_index_store;
mod state_hook;
mod sync;

pub use enqueuer::IndexedJobEnqueuer;
pub use models::{IndexPayload, JobIndex, PayloadError, UNKNOWN_SLUG};
pub use schema::JOB_INDEX_VERSIONED_SCHEMAS;
pub use sqlite_job_index_store::SqliteJobIndexStore;
pub use state_hook::JobIndexStateHook;
pub use sync::{JobIndexSyncService, SyncReport};

use crate::background_jobs::JobState;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Default page size for org/dataset queries.
pub const DEFAULT_ORG_DS_TAKE: usize = 200;
/// Default page size for state queries.
pub const DEFAULT_STATE_TAKE: usize = 1000;

/// Persistence for [`JobIndex`] rows.
pub trait JobIndexStore: Send + Sync {
    /// Insert a `Created` row for a freshly submitted job. When a row already
    /// exists only the metadata columns are refreshed.
    fn upsert_on_enqueue(
        &self,
        job_id: &str,
        payload: &IndexPayload,
        method_display: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a transition. Synthesizes a shell row for unknown jobs and sets
    /// the matching first-reached timestamp only once.
    fn update_state(&self, job_id: &str, state: JobState, changed_at: DateTime<Utc>) -> Result<()>;

    fn get(&self, job_id: &str) -> Result<Option<JobIndex>>;

    /// Rows for a dataset, newest first.
    fn get_by_org_ds(&self, org_slug: &str, ds_slug: &str, skip: usize, take: usize)
        -> Result<Vec<JobIndex>>;

    /// Rows for a dataset whose path equals `path`, or starts with it when
    /// `prefix` is set.
    fn get_by_org_ds_path(
        &self,
        org_slug: &str,
        ds_slug: &str,
        path: &str,
        prefix: bool,
    ) -> Result<Vec<JobIndex>>;

    /// Rows in `state`, oldest first.
    fn get_by_state(&self, state: JobState, skip: usize, take: usize) -> Result<Vec<JobIndex>>;

    /// Rows not in a terminal state, oldest first.
    fn get_non_terminal(&self, skip: usize, take: usize) -> Result<Vec<JobIndex>>;

    fn delete_by_org_ds(&self, org_slug: &str, ds_slug: &str) -> Result<usize>;

    /// Delete terminal rows whose last transition is older than `cutoff`.
    fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
