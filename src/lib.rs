//! Dataset registry job reconciliation library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod build_pending;
pub mod cache;
pub mod cleanup;
pub mod config;
pub mod ddb;
pub mod job_index;
pub mod registry_store;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use background_jobs::{JobEngine, JobState, LocalJobEngine};
pub use job_index::{IndexPayload, IndexedJobEnqueuer, JobIndexStore, SqliteJobIndexStore};
pub use registry_store::{DatasetCatalog, SqliteRegistryStore};
