//! Job implementations submitted to the engine.

mod build_dataset;
mod dataset_cleanup;
mod engine_expiry;
mod job_index_cleanup;
mod job_index_sync;
mod orphaned_folders;
mod process_pending_builds;

pub use build_dataset::BuildDatasetJob;
pub use dataset_cleanup::{submit_dataset_cleanup, DatasetCleanupJob};
pub use engine_expiry::EngineExpiryJob;
pub use job_index_cleanup::JobIndexCleanupJob;
pub use job_index_sync::JobIndexSyncJob;
pub use orphaned_folders::OrphanedFoldersJob;
pub use process_pending_builds::ProcessPendingBuildsJob;
