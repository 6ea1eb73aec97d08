use super::engine::JobEngine;
use super::job::{JobError, JobSchedule, RecurringJob};
use super::state::JobState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Information about a registered recurring job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub last_submitted_at: Option<String>,
    pub last_job_id: Option<String>,
    pub last_job_state: Option<JobState>,
    pub next_run_at: Option<String>,
}

/// Serializable schedule information.
#[derive(Debug, Clone, Serialize)]
pub struct JobScheduleInfo {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Vec<String>>,
}

impl From<&JobSchedule> for JobScheduleInfo {
    fn from(schedule: &JobSchedule) -> Self {
        match schedule {
            JobSchedule::Interval(duration) => JobScheduleInfo {
                schedule_type: "interval".to_string(),
                value_secs: Some(duration.as_secs()),
                hooks: None,
            },
            JobSchedule::Hook(event) => JobScheduleInfo {
                schedule_type: "hook".to_string(),
                hooks: Some(vec![event.to_string()]),
                value_secs: None,
            },
            JobSchedule::Combined { interval, hooks } => JobScheduleInfo {
                schedule_type: "combined".to_string(),
                value_secs: interval.map(|d| d.as_secs()),
                hooks: Some(hooks.iter().map(|h| h.to_string()).collect()),
            },
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<String, JobError>>,
    },
}

/// Bookkeeping for one recurring job.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_submitted_at: Option<DateTime<Utc>>,
    /// Engine id of the most recent submission.
    pub last_job_id: Option<String>,
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, RecurringJob>,
    pub schedules: HashMap<String, ScheduleState>,
}

/// Handle to interact with the recurring scheduler from HTTP handlers.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
    engine: Arc<dyn JobEngine>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
        engine: Arc<dyn JobEngine>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            engine,
        }
    }

    fn job_info(&self, job: &RecurringJob, schedule: Option<&ScheduleState>) -> JobInfo {
        let schedule = schedule.cloned().unwrap_or_default();
        let last_job_state = schedule
            .last_job_id
            .as_deref()
            .and_then(|id| self.engine.get_state(id).ok().flatten());
        JobInfo {
            id: job.id.to_string(),
            name: job.name.to_string(),
            description: job.description.to_string(),
            schedule: JobScheduleInfo::from(&job.schedule),
            last_submitted_at: schedule.last_submitted_at.map(|dt| dt.to_rfc3339()),
            last_job_id: schedule.last_job_id,
            last_job_state,
            next_run_at: schedule.next_run_at.map(|dt| dt.to_rfc3339()),
        }
    }

    /// Get information about all registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .values()
            .map(|job| self.job_info(job, state.schedules.get(job.id)))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let state = self.shared_state.read().await;
        Ok(state
            .jobs
            .get(job_id)
            .map(|job| self.job_info(job, state.schedules.get(job_id))))
    }

    pub async fn job_exists(&self, job_id: &str) -> bool {
        self.shared_state.read().await.jobs.contains_key(job_id)
    }

    /// Submit a recurring job now. Returns the engine job id.
    pub async fn trigger_job(&self, job_id: &str) -> Result<String, JobError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler dropped request".to_string()))?
    }
}
