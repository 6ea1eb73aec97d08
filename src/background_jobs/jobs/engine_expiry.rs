use crate::background_jobs::{BackgroundJob, JobContext, JobError, LocalJobEngine, RetryPolicy};
use chrono::{Duration, Utc};
use tracing::info;

/// Forgets terminal engine records past their expiration.
pub struct EngineExpiryJob {
    engine: LocalJobEngine,
    expiration: Duration,
}

impl EngineExpiryJob {
    pub fn new(engine: LocalJobEngine, expiration_hours: u64) -> Self {
        Self {
            engine,
            expiration: Duration::hours(expiration_hours as i64),
        }
    }
}

impl BackgroundJob for EngineExpiryJob {
    fn name(&self) -> String {
        "Expire finished engine jobs".to_string()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        let purged = self
            .engine
            .purge_terminal_before(Utc::now() - self.expiration)?;
        info!("Expired {} finished engine jobs", purged);
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }
}
