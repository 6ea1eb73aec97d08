use super::context::JobContext;
use super::retry_policy::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Schedule for when a recurring job should be submitted.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Submit at fixed intervals
    Interval(Duration),
    /// Submit only in response to hooks
    Hook(HookEvent),
    /// Combination of interval and hook-triggered submission
    Combined {
        interval: Option<Duration>,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            JobSchedule::Interval(interval) => Some(*interval),
            JobSchedule::Combined { interval, .. } => *interval,
            JobSchedule::Hook(_) => None,
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Hook(hook) => *hook == event,
            JobSchedule::Combined { hooks, .. } => hooks.contains(&event),
            JobSchedule::Interval(_) => false,
        }
    }
}

/// Events that can trigger hook-based jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnStartup,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::OnStartup => write!(f, "OnStartup"),
        }
    }
}

/// How the engine may run a job relative to other jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Concurrency {
    /// Any number of instances may run at once.
    Parallel,
    /// Only one job holding `key` runs at a time. A worker waits at most
    /// `timeout` for the key before failing the attempt.
    Exclusive { key: String, timeout: Duration },
}

/// Errors that can occur during job execution.
#[derive(Debug)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    ExecutionFailed(String),
    Cancelled,
    LockTimeout(String),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::Cancelled | JobError::NotFound)
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
            JobError::LockTimeout(key) => write!(f, "Timed out waiting for lock '{}'", key),
        }
    }
}

impl std::error::Error for JobError {}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// A unit of work executed by the job engine.
///
/// Jobs are executed synchronously in a blocking context. The same instance
/// is executed again when the engine retries a failed attempt, so `execute`
/// must be safe to re-run.
pub trait BackgroundJob: Send + Sync {
    /// Human-readable description of the invoked operation.
    fn name(&self) -> String;

    /// Execute the job.
    ///
    /// Called from `spawn_blocking`. Long loops should check
    /// `ctx.is_cancelled()`, which only fires on engine shutdown.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    fn concurrency(&self) -> Concurrency {
        Concurrency::Parallel
    }
}

/// A job the recurring scheduler submits to the engine on its schedule.
#[derive(Clone)]
pub struct RecurringJob {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub schedule: JobSchedule,
    pub job: Arc<dyn BackgroundJob>,
}
