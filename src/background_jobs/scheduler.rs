use super::engine::JobEngine;
use super::handle::{ScheduleState, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{HookEvent, JobError, RecurringJob};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upper bound on how long the loop sleeps between checks.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Submits recurring jobs to the engine on their schedule.
///
/// The scheduler never executes anything itself. A due job whose previous
/// submission is still active in the engine is skipped for that tick.
pub struct RecurringScheduler {
    shared_state: Arc<RwLock<SharedJobState>>,
    engine: Arc<dyn JobEngine>,
    command_receiver: mpsc::Receiver<SchedulerCommand>,
    shutdown_token: CancellationToken,
}

impl RecurringScheduler {
    pub fn new(
        engine: Arc<dyn JobEngine>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            engine,
            command_receiver,
            shutdown_token,
        }
    }

    pub async fn register_job(&mut self, job: RecurringJob) {
        info!("Registering recurring job: {} - {}", job.id, job.description);
        let now = chrono::Utc::now();
        // Interval jobs are due right away unless a startup hook covers them
        let next_run_at = job.schedule.interval().map(|interval| {
            if job.schedule.listens_to(HookEvent::OnStartup) {
                now + chrono::Duration::from_std(interval).unwrap_or_default()
            } else {
                now
            }
        });
        let schedule = ScheduleState {
            next_run_at,
            ..Default::default()
        };
        let mut state = self.shared_state.write().await;
        state.schedules.insert(job.id.to_string(), schedule);
        state.jobs.insert(job.id.to_string(), job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting recurring scheduler with {} registered jobs", job_count);

        self.trigger_jobs_for_hook(HookEvent::OnStartup).await;

        loop {
            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Recurring scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.submit_job(&job_id, "manual").await;
                let _ = response.send(result);
            }
        }
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = chrono::Utc::now();
        let state = self.shared_state.read().await;
        state
            .schedules
            .values()
            .filter_map(|s| s.next_run_at)
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(MAX_SLEEP)
            .min(MAX_SLEEP)
    }

    async fn run_due_jobs(&mut self) {
        let now = chrono::Utc::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .schedules
                .iter()
                .filter(|(_, s)| s.next_run_at.is_some_and(|next| next <= now))
                .map(|(id, _)| id.clone())
                .collect()
        };

        for job_id in due {
            match self.submit_job(&job_id, "schedule").await {
                Ok(_) | Err(JobError::AlreadyRunning) => {}
                Err(e) => error!("Failed to submit recurring job {}: {}", job_id, e),
            }
        }
    }

    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let listening: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .values()
                .filter(|job| job.schedule.listens_to(event))
                .map(|job| job.id.to_string())
                .collect()
        };

        let trigger = format!("hook:{}", event);
        for job_id in listening {
            if let Err(e) = self.submit_job(&job_id, &trigger).await {
                debug!("Hook {} did not submit {}: {}", event, job_id, e);
            }
        }
    }

    /// Submit a registered job to the engine and advance its schedule.
    async fn submit_job(&mut self, job_id: &str, triggered_by: &str) -> Result<String, JobError> {
        let mut state = self.shared_state.write().await;
        let Some(job) = state.jobs.get(job_id).cloned() else {
            return Err(JobError::NotFound);
        };
        let schedule = state.schedules.entry(job_id.to_string()).or_default();

        let now = chrono::Utc::now();
        if let Some(interval) = job.schedule.interval() {
            schedule.next_run_at =
                Some(now + chrono::Duration::from_std(interval).unwrap_or_default());
        }

        if let Some(previous) = schedule.last_job_id.as_deref() {
            match self.engine.get_state(previous) {
                Ok(Some(s)) if !s.is_terminal() => {
                    debug!(
                        "Skipping {} ({}): previous submission {} is {}",
                        job_id, triggered_by, previous, s
                    );
                    return Err(JobError::AlreadyRunning);
                }
                Ok(_) => {}
                Err(e) => error!("Failed to read state of job {}: {}", previous, e),
            }
        }

        let engine_job_id = self.engine.submit(job.job.clone(), None)?;
        info!(
            "Submitted recurring job: {} as {} (triggered_by: {})",
            job_id, engine_job_id, triggered_by
        );
        schedule.last_submitted_at = Some(now);
        schedule.last_job_id = Some(engine_job_id.clone());
        Ok(engine_job_id)
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    engine: Arc<dyn JobEngine>,
    shutdown_token: CancellationToken,
) -> (RecurringScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = RecurringScheduler::new(
        Arc::clone(&engine),
        command_rx,
        shutdown_token,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state, engine);

    (scheduler, handle)
}
