use crate::background_jobs::{BackgroundJob, JobContext, JobError, RetryPolicy};
use crate::cleanup::JobIndexCleanupService;
use std::sync::Arc;
use std::time::Duration;

pub struct JobIndexCleanupJob {
    service: Arc<JobIndexCleanupService>,
}

impl JobIndexCleanupJob {
    pub fn new(service: Arc<JobIndexCleanupService>) -> Self {
        Self { service }
    }
}

impl BackgroundJob for JobIndexCleanupJob {
    fn name(&self) -> String {
        "Clean up old job index rows".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.service.cleanup_old_job_indices()?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delays(2, vec![Duration::from_secs(60)])
    }
}
