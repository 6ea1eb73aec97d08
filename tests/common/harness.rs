//! Test harness lifecycle management
//!
//! Each test gets isolated databases and a dataset tree in its own temp dir.
//! When dropped, the engine workers are shut down.

#![allow(dead_code)]

use super::constants::*;
use dataset_registry_jobs::background_jobs::{JobEngine, JobState, LocalJobEngine};
use dataset_registry_jobs::build_pending::BuildPendingService;
use dataset_registry_jobs::cache::InMemoryCacheManager;
use dataset_registry_jobs::cleanup::{
    DatasetCleanupService, JobIndexCleanupService, OrphanedFolderCleanupService,
};
use dataset_registry_jobs::ddb::{FsDdb, FsDdbManager};
use dataset_registry_jobs::job_index::{
    IndexedJobEnqueuer, JobIndex, JobIndexStateHook, JobIndexStore, JobIndexSyncService,
    SqliteJobIndexStore,
};
use dataset_registry_jobs::registry_store::SqliteRegistryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct TestHarness {
    _temp_dir: TempDir,
    pub datasets_path: PathBuf,
    pub registry: Arc<SqliteRegistryStore>,
    pub store: Arc<SqliteJobIndexStore>,
    pub engine: LocalJobEngine,
    pub ddb_manager: Arc<FsDdbManager>,
    pub cache: Arc<InMemoryCacheManager>,
    pub enqueuer: IndexedJobEnqueuer,
    shutdown_token: CancellationToken,
}

impl TestHarness {
    /// Open fresh stores and start the engine with the index hook attached.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let datasets_path = temp_dir.path().join("datasets");
        std::fs::create_dir_all(&datasets_path).expect("Failed to create datasets dir");

        let registry = Arc::new(
            SqliteRegistryStore::new(temp_dir.path().join("registry.db"))
                .expect("Failed to open registry store"),
        );
        let store = Arc::new(
            SqliteJobIndexStore::new(temp_dir.path().join("job_index.db"))
                .expect("Failed to open job index store"),
        );

        let shutdown_token = CancellationToken::new();
        let engine = LocalJobEngine::new(shutdown_token.clone());
        engine.add_observer(Arc::new(JobIndexStateHook::new(store.clone())));
        engine.start(ENGINE_WORKERS);

        let ddb_manager = Arc::new(FsDdbManager::new(datasets_path.clone()));
        let enqueuer = IndexedJobEnqueuer::new(Arc::new(engine.clone()), store.clone());

        Self {
            _temp_dir: temp_dir,
            datasets_path,
            registry,
            store,
            engine,
            ddb_manager,
            cache: Arc::new(InMemoryCacheManager::new()),
            enqueuer,
            shutdown_token,
        }
    }

    pub fn engine_arc(&self) -> Arc<dyn JobEngine> {
        Arc::new(self.engine.clone())
    }

    /// Register the dataset and create its folder.
    pub fn create_dataset(&self, org_slug: &str, ds_slug: &str) -> (Uuid, FsDdb) {
        self.registry
            .add_organization(org_slug)
            .expect("Failed to add organization");
        let internal_ref = self
            .registry
            .add_dataset(org_slug, ds_slug)
            .expect("Failed to add dataset");
        let ddb = self
            .ddb_manager
            .create(org_slug, internal_ref)
            .expect("Failed to create dataset folder");
        (internal_ref, ddb)
    }

    pub fn dataset_path(&self, org_slug: &str, internal_ref: Uuid) -> PathBuf {
        self.ddb_manager.dataset_path(org_slug, internal_ref)
    }

    /// Create a bare folder under the datasets root, bypassing the registry.
    pub fn create_folder(&self, relative: impl AsRef<Path>) -> PathBuf {
        let path = self.datasets_path.join(relative);
        std::fs::create_dir_all(&path).expect("Failed to create folder");
        path
    }

    pub fn build_pending_service(&self) -> BuildPendingService {
        BuildPendingService::new(
            self.registry.clone(),
            self.ddb_manager.clone(),
            self.enqueuer.clone(),
            self.cache.clone(),
        )
        .expect("Failed to create build pending service")
    }

    pub fn dataset_cleanup_service(&self) -> DatasetCleanupService {
        DatasetCleanupService::new(
            self.engine_arc(),
            self.store.clone(),
            self.ddb_manager.clone(),
        )
    }

    pub fn orphaned_folder_service(&self) -> OrphanedFolderCleanupService {
        OrphanedFolderCleanupService::new(self.registry.clone(), self.datasets_path.clone())
    }

    pub fn retention_service(&self, retention_days: i64) -> JobIndexCleanupService {
        JobIndexCleanupService::new(self.store.clone(), retention_days)
    }

    pub fn sync_service(&self) -> JobIndexSyncService {
        JobIndexSyncService::new(self.engine_arc(), self.store.clone())
    }

    /// Poll the engine until `job_id` reaches `state`.
    pub async fn wait_for_state(&self, job_id: &str, state: JobState) {
        let deadline = Instant::now() + STATE_TIMEOUT;
        loop {
            let current = self.engine.get_state(job_id).expect("Failed to read state");
            if current == Some(state) {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "Job {} did not reach {} (last seen {:?})",
                job_id,
                state,
                current
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn index_row(&self, job_id: &str) -> Option<JobIndex> {
        self.store.get(job_id).expect("Failed to read index row")
    }

    pub fn dataset_rows(&self, org_slug: &str, ds_slug: &str) -> Vec<JobIndex> {
        self.store
            .get_by_org_ds(org_slug, ds_slug, 0, 1000)
            .expect("Failed to query index")
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
