//! Job execution engine and recurring job scheduling.
//!
//! Every unit of background work, whether submitted by a component or by the
//! recurring scheduler, runs as a job in the [`LocalJobEngine`]. State
//! transitions are published to [`StateObserver`]s.

mod context;
mod engine;
mod handle;
mod job;
pub mod jobs;
mod retry_policy;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use context::JobContext;
pub use engine::{JobEngine, JobSnapshot, LocalJobEngine, StateObserver};
pub use handle::{JobInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, Concurrency, HookEvent, JobError, JobSchedule, RecurringJob};
pub use retry_policy::RetryPolicy;
pub use scheduler::{create_scheduler, RecurringScheduler};
pub use state::JobState;
