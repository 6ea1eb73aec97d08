use super::JobIndexStore;
use crate::background_jobs::{JobState, StateObserver};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

/// Forwards every engine transition into the job index.
pub struct JobIndexStateHook {
    store: Arc<dyn JobIndexStore>,
}

impl JobIndexStateHook {
    pub fn new(store: Arc<dyn JobIndexStore>) -> Self {
        Self { store }
    }
}

impl StateObserver for JobIndexStateHook {
    fn on_state_applied(&self, job_id: &str, state: JobState, at: DateTime<Utc>) {
        if let Err(e) = self.store.update_state(job_id, state, at) {
            error!("Failed to mirror {} for job {}: {:#}", state, job_id, e);
        }
    }
}
