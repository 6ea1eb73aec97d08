//! In-process job engine.
//!
//! Jobs are submitted into an unbounded queue drained by a fixed pool of
//! worker tasks. Each attempt runs on a blocking thread. State transitions
//! are published synchronously to registered [`StateObserver`]s.

use super::context::JobContext;
use super::job::{BackgroundJob, Concurrency, JobError};
use super::state::JobState;
use crate::server::metrics;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operations the reconciliation components need from a job engine.
pub trait JobEngine: Send + Sync {
    /// Accept a job for execution and return its identifier.
    fn submit(&self, job: Arc<dyn BackgroundJob>, queue: Option<&str>) -> Result<String>;

    /// Move a non-terminal job to `Deleted`. Returns false when the job is
    /// unknown or already terminal. An attempt already executing is not
    /// interrupted.
    fn cancel(&self, job_id: &str) -> Result<bool>;

    fn set_job_tag(&self, job_id: &str, key: &str, value: &str) -> Result<()>;

    /// Current state, or `None` when the engine no longer knows the job.
    fn get_state(&self, job_id: &str) -> Result<Option<JobState>>;
}

/// Receives every state transition the engine applies.
///
/// Called synchronously while the engine's record table is locked, so an
/// observer must not call back into the engine. Panics are caught and logged.
pub trait StateObserver: Send + Sync {
    fn on_state_applied(&self, job_id: &str, state: JobState, at: DateTime<Utc>);
}

/// Point-in-time view of a job record.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub name: String,
    pub queue: Option<String>,
    pub state: JobState,
    pub attempt: u32,
    pub tags: HashMap<String, String>,
    pub created_at: String,
    pub last_state_change: String,
}

struct JobRecord {
    job: Arc<dyn BackgroundJob>,
    name: String,
    queue: Option<String>,
    state: JobState,
    attempt: u32,
    tags: HashMap<String, String>,
    created_at: DateTime<Utc>,
    last_state_change: DateTime<Utc>,
}

struct EngineInner {
    records: Mutex<HashMap<String, JobRecord>>,
    next_id: AtomicU64,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    observers: RwLock<Vec<Arc<dyn StateObserver>>>,
    exclusive_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    shutdown_token: CancellationToken,
}

/// Multi-worker engine keeping job records in memory.
#[derive(Clone)]
pub struct LocalJobEngine {
    inner: Arc<EngineInner>,
}

impl LocalJobEngine {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(EngineInner {
                records: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                observers: RwLock::new(Vec::new()),
                exclusive_locks: Mutex::new(HashMap::new()),
                shutdown_token,
            }),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        match self.inner.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(_) => error!("Observer list lock poisoned, observer not registered"),
        }
    }

    /// Spawn `worker_count` workers draining the queue until shutdown.
    pub fn start(&self, worker_count: usize) -> Vec<JoinHandle<()>> {
        let worker_count = worker_count.max(1);
        info!("Starting job engine with {} workers", worker_count);
        (0..worker_count)
            .map(|worker| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.worker_loop(worker).await })
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.inner.shutdown_token.cancel();
    }

    pub fn snapshot(&self, job_id: &str) -> Result<Option<JobSnapshot>> {
        let records = self.inner.records()?;
        Ok(records.get(job_id).map(|record| JobSnapshot {
            job_id: job_id.to_string(),
            name: record.name.clone(),
            queue: record.queue.clone(),
            state: record.state,
            attempt: record.attempt,
            tags: record.tags.clone(),
            created_at: record.created_at.to_rfc3339(),
            last_state_change: record.last_state_change.to_rfc3339(),
        }))
    }

    pub fn job_tags(&self, job_id: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(self.inner.records()?.get(job_id).map(|r| r.tags.clone()))
    }

    /// Forget terminal jobs whose last transition happened before `cutoff`.
    pub fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.inner.records()?;
        let before = records.len();
        records.retain(|_, r| !(r.state.is_terminal() && r.last_state_change < cutoff));
        Ok(before - records.len())
    }
}

impl JobEngine for LocalJobEngine {
    fn submit(&self, job: Arc<dyn BackgroundJob>, queue: Option<&str>) -> Result<String> {
        let job_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let now = Utc::now();
        let name = job.name();
        debug!("Submitting job {} ({})", job_id, name);

        self.inner.records()?.insert(
            job_id.clone(),
            JobRecord {
                job,
                name,
                queue: queue.map(str::to_string),
                state: JobState::Created,
                attempt: 0,
                tags: HashMap::new(),
                created_at: now,
                last_state_change: now,
            },
        );

        self.inner
            .transition(&job_id, JobState::Enqueued, |s| s == JobState::Created)?;
        if self.inner.queue_tx.send(job_id.clone()).is_err() {
            self.inner.records()?.remove(&job_id);
            bail!("Job engine queue is closed");
        }
        Ok(job_id)
    }

    fn cancel(&self, job_id: &str) -> Result<bool> {
        let cancelled = self
            .inner
            .transition(job_id, JobState::Deleted, |s| !s.is_terminal())?;
        if cancelled {
            info!("Cancelled job {}", job_id);
        }
        Ok(cancelled)
    }

    fn set_job_tag(&self, job_id: &str, key: &str, value: &str) -> Result<()> {
        let mut records = self.inner.records()?;
        match records.get_mut(job_id) {
            Some(record) => {
                record.tags.insert(key.to_string(), value.to_string());
                Ok(())
            }
            None => bail!("Job {} not found", job_id),
        }
    }

    fn get_state(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.inner.records()?.get(job_id).map(|r| r.state))
    }
}

enum AttemptOutcome {
    Completed,
    Failed(JobError),
    Panicked(String),
}

impl EngineInner {
    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, JobRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("Job record table lock poisoned"))
    }

    /// Apply `to` if the current state satisfies `allowed`. Observers are
    /// notified before the record lock is released so they see transitions of
    /// one job in order.
    fn transition(
        &self,
        job_id: &str,
        to: JobState,
        allowed: impl Fn(JobState) -> bool,
    ) -> Result<bool> {
        let at = Utc::now();
        let mut records = self.records()?;
        let Some(record) = records.get_mut(job_id) else {
            return Ok(false);
        };
        if !allowed(record.state) {
            return Ok(false);
        }
        record.state = to;
        record.last_state_change = at;

        metrics::record_job_state_transition(to.as_str());
        self.notify(job_id, to, at);
        drop(records);
        Ok(true)
    }

    fn notify(&self, job_id: &str, state: JobState, at: DateTime<Utc>) {
        let observers = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(_) => {
                error!("Observer list lock poisoned, dropping {} for {}", state, job_id);
                return;
            }
        };
        for observer in observers {
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.on_state_applied(job_id, state, at)
            }));
            if result.is_err() {
                error!(
                    "State observer panicked while applying {} to job {}",
                    state, job_id
                );
            }
        }
    }

    fn exclusive_lock(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .exclusive_locks
            .lock()
            .map_err(|_| anyhow!("Exclusive lock table poisoned"))?;
        Ok(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        debug!("Job worker {} started", worker);
        loop {
            let next = {
                let mut rx = self.queue_rx.lock().await;
                tokio::select! {
                    job_id = rx.recv() => job_id,
                    _ = self.shutdown_token.cancelled() => None,
                }
            };
            match next {
                Some(job_id) => self.run_job(job_id).await,
                None => break,
            }
        }
        debug!("Job worker {} stopped", worker);
    }

    async fn run_job(self: &Arc<Self>, job_id: String) {
        match self.transition(&job_id, JobState::Processing, |s| s == JobState::Enqueued) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Skipping job {}: no longer enqueued", job_id);
                return;
            }
            Err(e) => {
                error!("Failed to start job {}: {}", job_id, e);
                return;
            }
        }

        let (job, name, attempt) = {
            let mut records = match self.records() {
                Ok(records) => records,
                Err(e) => {
                    error!("Failed to load job {}: {}", job_id, e);
                    return;
                }
            };
            let Some(record) = records.get_mut(&job_id) else {
                return;
            };
            record.attempt += 1;
            (Arc::clone(&record.job), record.name.clone(), record.attempt)
        };

        info!("Starting job: {} ({}, attempt {})", job_id, name, attempt);
        metrics::set_background_job_running(&name, true);
        let start_time = Instant::now();

        let outcome = match self.acquire_concurrency(job.concurrency()).await {
            Ok(guard) => {
                let ctx = JobContext::new(&job_id, attempt, self.shutdown_token.child_token());
                let job_for_attempt = Arc::clone(&job);
                let result =
                    tokio::task::spawn_blocking(move || job_for_attempt.execute(&ctx)).await;
                drop(guard);
                match result {
                    Ok(Ok(())) => AttemptOutcome::Completed,
                    Ok(Err(e)) => AttemptOutcome::Failed(e),
                    Err(e) => AttemptOutcome::Panicked(e.to_string()),
                }
            }
            Err(e) => AttemptOutcome::Failed(e),
        };

        let elapsed = start_time.elapsed();
        metrics::set_background_job_running(&name, false);
        self.finish_attempt(&job_id, &name, attempt, job.as_ref(), outcome, elapsed);
    }

    async fn acquire_concurrency(
        &self,
        concurrency: Concurrency,
    ) -> Result<Option<OwnedMutexGuard<()>>, JobError> {
        match concurrency {
            Concurrency::Parallel => Ok(None),
            Concurrency::Exclusive { key, timeout } => {
                let lock = self
                    .exclusive_lock(&key)
                    .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
                match tokio::time::timeout(timeout, lock.lock_owned()).await {
                    Ok(guard) => Ok(Some(guard)),
                    Err(_) => Err(JobError::LockTimeout(key)),
                }
            }
        }
    }

    fn finish_attempt(
        self: &Arc<Self>,
        job_id: &str,
        name: &str,
        attempt: u32,
        job: &dyn BackgroundJob,
        outcome: AttemptOutcome,
        elapsed: std::time::Duration,
    ) {
        let from_processing = |s: JobState| s == JobState::Processing;
        let applied = match outcome {
            AttemptOutcome::Completed => {
                info!("Job {} completed successfully in {:?}", job_id, elapsed);
                metrics::record_background_job_execution(name, "success", elapsed);
                self.transition(job_id, JobState::Succeeded, from_processing)
            }
            AttemptOutcome::Failed(e) => {
                let policy = job.retry_policy();
                if policy.should_retry(&e, attempt) {
                    let delay = policy.backoff(attempt - 1);
                    warn!(
                        "Job {} failed on attempt {} after {:?}, retrying in {:?}: {}",
                        job_id, attempt, elapsed, delay, e
                    );
                    metrics::record_background_job_execution(name, "retry", elapsed);
                    let scheduled = self.transition(job_id, JobState::Scheduled, from_processing);
                    if matches!(scheduled, Ok(true)) {
                        self.schedule_retry(job_id.to_string(), delay);
                    }
                    scheduled
                } else {
                    error!(
                        "Job {} failed after {:?} (attempt {}): {}",
                        job_id, elapsed, attempt, e
                    );
                    metrics::record_background_job_execution(name, "failed", elapsed);
                    self.transition(job_id, JobState::Failed, from_processing)
                }
            }
            AttemptOutcome::Panicked(msg) => {
                error!("Job {} panicked after {:?}: {}", job_id, elapsed, msg);
                metrics::record_background_job_execution(name, "panic", elapsed);
                self.transition(job_id, JobState::Failed, from_processing)
            }
        };

        match applied {
            Ok(true) => {}
            Ok(false) => debug!("Job {} left processing while running, final state kept", job_id),
            Err(e) => error!("Failed to record outcome of job {}: {}", job_id, e),
        }
    }

    fn schedule_retry(self: &Arc<Self>, job_id: String, delay: std::time::Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = inner.shutdown_token.cancelled() => return,
            }
            match inner.transition(&job_id, JobState::Enqueued, |s| s == JobState::Scheduled) {
                Ok(true) => {
                    if inner.queue_tx.send(job_id.clone()).is_err() {
                        error!("Job engine queue closed, retry of {} dropped", job_id);
                    }
                }
                Ok(false) => debug!("Retry of job {} skipped: no longer scheduled", job_id),
                Err(e) => error!("Failed to requeue job {}: {}", job_id, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::testing::{wait_for_state, RecordingObserver};
    use crate::background_jobs::RetryPolicy;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    struct PanickingObserver;

    impl StateObserver for PanickingObserver {
        fn on_state_applied(&self, _job_id: &str, _state: JobState, _at: DateTime<Utc>) {
            panic!("observer failure");
        }
    }

    struct CountingJob {
        executions: Arc<AtomicUsize>,
        fail_times: usize,
        policy: RetryPolicy,
        concurrency: Concurrency,
        hold: Duration,
    }

    impl CountingJob {
        fn new(executions: Arc<AtomicUsize>) -> Self {
            Self {
                executions,
                fail_times: 0,
                policy: RetryPolicy::none(),
                concurrency: Concurrency::Parallel,
                hold: Duration::ZERO,
            }
        }
    }

    impl BackgroundJob for CountingJob {
        fn name(&self) -> String {
            "Counting job".to_string()
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            let n = self.executions.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.hold);
            if n < self.fail_times {
                Err(JobError::ExecutionFailed(format!("failure {}", n)))
            } else {
                Ok(())
            }
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy.clone()
        }

        fn concurrency(&self) -> Concurrency {
            self.concurrency.clone()
        }
    }

    /// Blocks until released, used to observe a job mid-flight.
    struct GateJob {
        started: Arc<AtomicBool>,
        release: Arc<AtomicBool>,
    }

    impl BackgroundJob for GateJob {
        fn name(&self) -> String {
            "Gate job".to_string()
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.started.store(true, Ordering::SeqCst);
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_successful_job_transitions() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        let observer = Arc::new(RecordingObserver::default());
        engine.add_observer(observer.clone());
        engine.start(2);

        let executions = Arc::new(AtomicUsize::new(0));
        let job_id = engine
            .submit(Arc::new(CountingJob::new(executions.clone())), Some("default"))
            .unwrap();

        wait_for_state(&engine, &job_id, JobState::Succeeded).await;
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(
            observer.states_of(&job_id),
            vec![JobState::Enqueued, JobState::Processing, JobState::Succeeded]
        );
        let snapshot = engine.snapshot(&job_id).unwrap().unwrap();
        assert_eq!(snapshot.queue.as_deref(), Some("default"));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_until_attempts_exhausted() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        let observer = Arc::new(RecordingObserver::default());
        engine.add_observer(observer.clone());
        engine.start(1);

        let executions = Arc::new(AtomicUsize::new(0));
        let mut job = CountingJob::new(executions.clone());
        job.fail_times = usize::MAX;
        job.policy = RetryPolicy::with_delays(3, vec![Duration::from_millis(10)]);
        let job_id = engine.submit(Arc::new(job), None).unwrap();

        wait_for_state(&engine, &job_id, JobState::Failed).await;
        assert_eq!(executions.load(Ordering::SeqCst), 3);
        let states = observer.states_of(&job_id);
        assert_eq!(
            states.iter().filter(|s| **s == JobState::Scheduled).count(),
            2
        );
        assert_eq!(states.last(), Some(&JobState::Failed));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_second_attempt() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        engine.start(1);

        let executions = Arc::new(AtomicUsize::new(0));
        let mut job = CountingJob::new(executions.clone());
        job.fail_times = 1;
        job.policy = RetryPolicy::with_delays(3, vec![Duration::from_millis(10)]);
        let job_id = engine.submit(Arc::new(job), None).unwrap();

        wait_for_state(&engine, &job_id, JobState::Succeeded).await;
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(engine.snapshot(&job_id).unwrap().unwrap().attempt, 2);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_queued_job_never_runs() {
        // Workers not started: the job stays queued
        let engine = LocalJobEngine::new(CancellationToken::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let job_id = engine
            .submit(Arc::new(CountingJob::new(executions.clone())), None)
            .unwrap();

        assert!(engine.cancel(&job_id).unwrap());
        assert!(!engine.cancel(&job_id).unwrap());
        assert!(!engine.cancel("missing").unwrap());

        engine.start(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(executions.load(Ordering::SeqCst), 0);
        assert_eq!(engine.get_state(&job_id).unwrap(), Some(JobState::Deleted));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_cancel_running_job_keeps_deleted_state() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        engine.start(1);

        let started = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        let job_id = engine
            .submit(
                Arc::new(GateJob {
                    started: started.clone(),
                    release: release.clone(),
                }),
                None,
            )
            .unwrap();

        wait_for_state(&engine, &job_id, JobState::Processing).await;
        assert!(engine.cancel(&job_id).unwrap());
        release.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(started.load(Ordering::SeqCst));
        assert_eq!(engine.get_state(&job_id).unwrap(), Some(JobState::Deleted));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_panicking_observer_does_not_block_transitions() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        engine.add_observer(Arc::new(PanickingObserver));
        let observer = Arc::new(RecordingObserver::default());
        engine.add_observer(observer.clone());
        engine.start(1);

        let job_id = engine
            .submit(
                Arc::new(CountingJob::new(Arc::new(AtomicUsize::new(0)))),
                None,
            )
            .unwrap();

        wait_for_state(&engine, &job_id, JobState::Succeeded).await;
        assert_eq!(observer.states_of(&job_id).len(), 3);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_exclusive_jobs_time_out_waiting_for_lock() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        engine.start(2);

        let exclusive = Concurrency::Exclusive {
            key: "scan".to_string(),
            timeout: Duration::from_millis(50),
        };
        let mut holder = CountingJob::new(Arc::new(AtomicUsize::new(0)));
        holder.concurrency = exclusive.clone();
        holder.hold = Duration::from_millis(400);
        let holder_id = engine.submit(Arc::new(holder), None).unwrap();
        wait_for_state(&engine, &holder_id, JobState::Processing).await;

        let waiter_runs = Arc::new(AtomicUsize::new(0));
        let mut waiter = CountingJob::new(waiter_runs.clone());
        waiter.concurrency = exclusive;
        let waiter_id = engine.submit(Arc::new(waiter), None).unwrap();

        wait_for_state(&engine, &waiter_id, JobState::Failed).await;
        assert_eq!(waiter_runs.load(Ordering::SeqCst), 0);
        wait_for_state(&engine, &holder_id, JobState::Succeeded).await;
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_tags_and_purge() {
        let engine = LocalJobEngine::new(CancellationToken::new());
        let job_id = engine
            .submit(
                Arc::new(CountingJob::new(Arc::new(AtomicUsize::new(0)))),
                None,
            )
            .unwrap();

        engine.set_job_tag(&job_id, "orgSlug", "acme").unwrap();
        assert!(engine.set_job_tag("missing", "orgSlug", "acme").is_err());
        let tags = engine.job_tags(&job_id).unwrap().unwrap();
        assert_eq!(tags.get("orgSlug").map(String::as_str), Some("acme"));

        // Active jobs survive a purge
        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(engine.purge_terminal_before(future).unwrap(), 0);

        engine.cancel(&job_id).unwrap();
        assert_eq!(engine.purge_terminal_before(future).unwrap(), 1);
        assert_eq!(engine.get_state(&job_id).unwrap(), None);
    }
}
