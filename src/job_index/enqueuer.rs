use super::models::IndexPayload;
use super::JobIndexStore;
use crate::background_jobs::{BackgroundJob, JobEngine};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Submits jobs to the engine and records them in the job index.
#[derive(Clone)]
pub struct IndexedJobEnqueuer {
    engine: Arc<dyn JobEngine>,
    store: Arc<dyn JobIndexStore>,
}

impl IndexedJobEnqueuer {
    pub fn new(engine: Arc<dyn JobEngine>, store: Arc<dyn JobIndexStore>) -> Self {
        Self { engine, store }
    }

    /// Submit `job` and index it under `payload`.
    ///
    /// Only validation and submission failures are returned. Tagging and the
    /// index write are best effort once the engine has accepted the job.
    pub fn enqueue(&self, job: Arc<dyn BackgroundJob>, payload: IndexPayload) -> Result<String> {
        payload.ensure_valid()?;

        let method_display = job.name();
        let job_id = self
            .engine
            .submit(job, payload.queue.as_deref())
            .with_context(|| {
                format!(
                    "Failed to submit '{}' for {}/{}",
                    method_display, payload.org_slug, payload.ds_slug
                )
            })?;

        if let Err(e) = self.tag(&job_id, &payload) {
            warn!("Failed to tag job {}: {:#}", job_id, e);
        }

        if let Err(e) =
            self.store
                .upsert_on_enqueue(&job_id, &payload, Some(&method_display), Utc::now())
        {
            warn!("Failed to index job {}: {:#}", job_id, e);
        }

        debug!(
            "Enqueued job {} ({}) for {}/{}",
            job_id, method_display, payload.org_slug, payload.ds_slug
        );
        Ok(job_id)
    }

    fn tag(&self, job_id: &str, payload: &IndexPayload) -> Result<()> {
        self.engine.set_job_tag(job_id, "orgSlug", &payload.org_slug)?;
        self.engine.set_job_tag(job_id, "dsSlug", &payload.ds_slug)?;
        let optional = [
            ("path", &payload.path),
            ("userId", &payload.user_id),
            ("queue", &payload.queue),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                self.engine.set_job_tag(job_id, key, value)?;
            }
        }
        Ok(())
    }
}
