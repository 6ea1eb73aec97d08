use crate::background_jobs::{BackgroundJob, JobContext, JobError, RetryPolicy};
use crate::cleanup::OrphanedFolderCleanupService;
use std::sync::Arc;
use std::time::Duration;

pub struct OrphanedFoldersJob {
    service: Arc<OrphanedFolderCleanupService>,
}

impl OrphanedFoldersJob {
    pub fn new(service: Arc<OrphanedFolderCleanupService>) -> Self {
        Self { service }
    }
}

impl BackgroundJob for OrphanedFoldersJob {
    fn name(&self) -> String {
        "Clean up orphaned dataset folders".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.service.cleanup_orphaned_folders()?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delays(2, vec![Duration::from_secs(60)])
    }
}
