use axum::extract::FromRef;

use crate::background_jobs::{JobEngine, SchedulerHandle};
use crate::build_pending::BuildPendingService;
use crate::cleanup::{DatasetCleanupService, JobIndexCleanupService};
use crate::job_index::JobIndexStore;
use crate::registry_store::SqliteRegistryStore;
use std::sync::Arc;
use std::time::Instant;

pub type GuardedJobEngine = Arc<dyn JobEngine>;
pub type GuardedJobIndexStore = Arc<dyn JobIndexStore>;
pub type GuardedRegistryStore = Arc<SqliteRegistryStore>;
pub type GuardedBuildPendingService = Arc<BuildPendingService>;
pub type GuardedDatasetCleanupService = Arc<DatasetCleanupService>;
pub type GuardedJobIndexCleanupService = Arc<JobIndexCleanupService>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub hash: String,
    pub engine: GuardedJobEngine,
    pub job_index_store: GuardedJobIndexStore,
    pub registry_store: GuardedRegistryStore,
    pub build_pending: GuardedBuildPendingService,
    pub dataset_cleanup: GuardedDatasetCleanupService,
    pub job_index_cleanup: GuardedJobIndexCleanupService,
    pub scheduler_handle: SchedulerHandle,
}

impl FromRef<ServerState> for GuardedJobIndexStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_index_store.clone()
    }
}

impl FromRef<ServerState> for GuardedBuildPendingService {
    fn from_ref(input: &ServerState) -> Self {
        input.build_pending.clone()
    }
}

impl FromRef<ServerState> for GuardedJobIndexCleanupService {
    fn from_ref(input: &ServerState) -> Self {
        input.job_index_cleanup.clone()
    }
}

impl FromRef<ServerState> for SchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
