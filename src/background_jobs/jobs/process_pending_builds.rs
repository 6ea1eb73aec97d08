use crate::background_jobs::{BackgroundJob, Concurrency, JobContext, JobError, RetryPolicy};
use crate::build_pending::BuildPendingService;
use std::sync::Arc;
use std::time::Duration;

const LOCK_KEY: &str = "process-pending-builds";
const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// One pending-build scan. Never retried: the next tick runs soon anyway.
pub struct ProcessPendingBuildsJob {
    service: Arc<BuildPendingService>,
}

impl ProcessPendingBuildsJob {
    pub fn new(service: Arc<BuildPendingService>) -> Self {
        Self { service }
    }
}

impl BackgroundJob for ProcessPendingBuildsJob {
    fn name(&self) -> String {
        "Process pending builds".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.service.process_pending_builds()?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::Exclusive {
            key: LOCK_KEY.to_string(),
            timeout: LOCK_TIMEOUT,
        }
    }
}
