//! Reconcilers that remove job index rows and dataset folders.

mod dataset_cleanup;
mod job_index_retention;
mod orphaned_folders;

pub use dataset_cleanup::{DatasetCleanupReport, DatasetCleanupService};
pub use job_index_retention::{
    effective_retention_days, retention_cutoff, JobIndexCleanupResult, JobIndexCleanupService,
    DEFAULT_RETENTION_DAYS,
};
pub use orphaned_folders::{OrphanCleanupReport, OrphanedFolderCleanupService};
