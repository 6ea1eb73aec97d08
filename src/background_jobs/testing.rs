//! Test doubles shared by unit tests across the crate.

use super::context::JobContext;
use super::engine::{JobEngine, StateObserver};
use super::job::{BackgroundJob, JobError};
use super::state::JobState;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every transition it observes.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<(String, JobState)>>,
}

impl RecordingObserver {
    pub fn states_of(&self, job_id: &str) -> Vec<JobState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, state)| *state)
            .collect()
    }
}

impl StateObserver for RecordingObserver {
    fn on_state_applied(&self, job_id: &str, state: JobState, _at: DateTime<Utc>) {
        self.events
            .lock()
            .unwrap()
            .push((job_id.to_string(), state));
    }
}

pub async fn wait_for_state(engine: &dyn JobEngine, job_id: &str, state: JobState) {
    for _ in 0..400 {
        if engine.get_state(job_id).unwrap() == Some(state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "job {} never reached {:?}, last {:?}",
        job_id,
        state,
        engine.get_state(job_id).unwrap()
    );
}

/// Job that does nothing, used where only the display name matters.
pub struct NoopJob {
    name: String,
}

impl NoopJob {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl BackgroundJob for NoopJob {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Engine double that never runs anything. States are set by the test.
#[derive(Default)]
pub struct FakeJobEngine {
    next_id: AtomicU64,
    submitted: Mutex<Vec<(String, String)>>,
    states: Mutex<HashMap<String, JobState>>,
    tags: Mutex<HashMap<String, HashMap<String, String>>>,
    cancel_calls: Mutex<Vec<String>>,
    failing_cancels: Mutex<Vec<String>>,
    fail_submit: AtomicBool,
    fail_tags: AtomicBool,
}

impl FakeJobEngine {
    pub fn fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tags(&self, fail: bool) {
        self.fail_tags.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancel_of(&self, job_id: &str) {
        self.failing_cancels.lock().unwrap().push(job_id.to_string());
    }

    pub fn set_state(&self, job_id: &str, state: JobState) {
        self.states.lock().unwrap().insert(job_id.to_string(), state);
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    /// Display names of submitted jobs, in submission order.
    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn tags_of(&self, job_id: &str) -> HashMap<String, String> {
        self.tags
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.cancel_calls.lock().unwrap().clone()
    }
}

impl JobEngine for FakeJobEngine {
    fn submit(&self, job: Arc<dyn BackgroundJob>, _queue: Option<&str>) -> anyhow::Result<String> {
        if self.fail_submit.load(Ordering::SeqCst) {
            anyhow::bail!("engine unavailable");
        }
        let job_id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.submitted
            .lock()
            .unwrap()
            .push((job_id.clone(), job.name()));
        self.set_state(&job_id, JobState::Enqueued);
        Ok(job_id)
    }

    fn cancel(&self, job_id: &str) -> anyhow::Result<bool> {
        self.cancel_calls.lock().unwrap().push(job_id.to_string());
        if self.failing_cancels.lock().unwrap().iter().any(|id| id == job_id) {
            anyhow::bail!("cancel of {} refused", job_id);
        }
        let mut states = self.states.lock().unwrap();
        match states.get(job_id) {
            Some(state) if !state.is_terminal() => {
                states.insert(job_id.to_string(), JobState::Deleted);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_job_tag(&self, job_id: &str, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_tags.load(Ordering::SeqCst) {
            anyhow::bail!("tag storage unavailable");
        }
        self.tags
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_state(&self, job_id: &str) -> anyhow::Result<Option<JobState>> {
        Ok(self.states.lock().unwrap().get(job_id).copied())
    }
}
