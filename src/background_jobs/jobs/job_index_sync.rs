use crate::background_jobs::{BackgroundJob, JobContext, JobError, RetryPolicy};
use crate::job_index::JobIndexSyncService;
use std::sync::Arc;

pub struct JobIndexSyncJob {
    service: Arc<JobIndexSyncService>,
}

impl JobIndexSyncJob {
    pub fn new(service: Arc<JobIndexSyncService>) -> Self {
        Self { service }
    }
}

impl BackgroundJob for JobIndexSyncJob {
    fn name(&self) -> String {
        "Sync job index states".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.service.sync_job_index_states()?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }
}
