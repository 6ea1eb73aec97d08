use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::ddb::Ddb;
use std::sync::Arc;
use tracing::info;

/// Runs the build over a dataset's pending files.
pub struct BuildDatasetJob {
    org_slug: String,
    ds_slug: String,
    ddb: Arc<dyn Ddb>,
}

impl BuildDatasetJob {
    pub fn new(org_slug: &str, ds_slug: &str, ddb: Arc<dyn Ddb>) -> Self {
        Self {
            org_slug: org_slug.to_string(),
            ds_slug: ds_slug.to_string(),
            ddb,
        }
    }
}

impl BackgroundJob for BuildDatasetJob {
    fn name(&self) -> String {
        format!("Build pending {}/{}", self.org_slug, self.ds_slug)
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        self.ddb.build_pending()?;
        info!("Built pending files of {}/{}", self.org_slug, self.ds_slug);
        Ok(())
    }
}
