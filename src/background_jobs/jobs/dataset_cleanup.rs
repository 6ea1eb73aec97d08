use crate::background_jobs::{BackgroundJob, JobContext, JobEngine, JobError, RetryPolicy};
use crate::cleanup::DatasetCleanupService;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Post-deletion teardown of one dataset.
pub struct DatasetCleanupJob {
    service: Arc<DatasetCleanupService>,
    org_slug: String,
    ds_slug: String,
    internal_ref: Uuid,
}

impl DatasetCleanupJob {
    pub fn new(
        service: Arc<DatasetCleanupService>,
        org_slug: &str,
        ds_slug: &str,
        internal_ref: Uuid,
    ) -> Self {
        Self {
            service,
            org_slug: org_slug.to_string(),
            ds_slug: ds_slug.to_string(),
            internal_ref,
        }
    }
}

impl BackgroundJob for DatasetCleanupJob {
    fn name(&self) -> String {
        format!("Clean up deleted dataset {}/{}", self.org_slug, self.ds_slug)
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.service
            .cleanup_deleted_dataset(&self.org_slug, &self.ds_slug, self.internal_ref)?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        // One retry per delay on top of the first attempt
        RetryPolicy::with_delays(
            4,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(120),
                Duration::from_secs(300),
            ],
        )
    }
}

/// Submit the teardown of a dataset whose record was just removed.
///
/// Not indexed under the dataset: the job would otherwise cancel itself and
/// delete its own row.
pub fn submit_dataset_cleanup(
    engine: &dyn JobEngine,
    service: Arc<DatasetCleanupService>,
    org_slug: &str,
    ds_slug: &str,
    internal_ref: Uuid,
) -> Result<String> {
    let job = DatasetCleanupJob::new(service, org_slug, ds_slug, internal_ref);
    let job_id = engine.submit(Arc::new(job), None)?;
    info!(
        "Submitted cleanup of dataset {}/{} as job {}",
        org_slug, ds_slug, job_id
    );
    Ok(job_id)
}
