use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Engine identifier of the running job.
    pub job_id: String,

    /// 1-based attempt number; greater than 1 when the engine retries.
    pub attempt: u32,

    /// Fires when the engine shuts down. Cancelling a job through the engine
    /// does not interrupt an attempt that is already executing.
    pub cancellation_token: CancellationToken,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, attempt: u32, cancellation_token: CancellationToken) -> Self {
        Self {
            job_id: job_id.into(),
            attempt,
            cancellation_token,
        }
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
