use crate::background_jobs::JobState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Org/dataset slug written on rows synthesized for transitions of jobs the
/// index has never seen enqueued.
pub const UNKNOWN_SLUG: &str = "(unknown)";

/// Queryable mirror of one engine job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobIndex {
    pub job_id: String,
    pub org_slug: String,
    pub ds_slug: String,
    pub path: Option<String>,
    pub user_id: Option<String>,
    pub queue: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub last_state_change_utc: DateTime<Utc>,
    /// State name as reported by the engine.
    pub current_state: String,
    pub processing_at_utc: Option<DateTime<Utc>>,
    pub succeeded_at_utc: Option<DateTime<Utc>>,
    pub failed_at_utc: Option<DateTime<Utc>>,
    pub deleted_at_utc: Option<DateTime<Utc>>,
    pub scheduled_at_utc: Option<DateTime<Utc>>,
    pub method_display: Option<String>,
}

impl JobIndex {
    /// Parsed state; `None` for names this build doesn't know.
    pub fn state(&self) -> Option<JobState> {
        JobState::parse(&self.current_state)
    }

    /// Unknown state names count as active so they are never purged blindly.
    pub fn is_active(&self) -> bool {
        self.state().map(|s| s.is_active()).unwrap_or(true)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("organization slug must not be empty")]
    MissingOrgSlug,
    #[error("dataset slug must not be empty")]
    MissingDsSlug,
}

/// Domain metadata attached to a job at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPayload {
    pub org_slug: String,
    pub ds_slug: String,
    pub path: Option<String>,
    pub user_id: Option<String>,
    pub queue: Option<String>,
}

impl IndexPayload {
    pub fn new(org_slug: impl Into<String>, ds_slug: impl Into<String>) -> Self {
        Self {
            org_slug: org_slug.into(),
            ds_slug: ds_slug.into(),
            path: None,
            user_id: None,
            queue: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn ensure_valid(&self) -> Result<(), PayloadError> {
        if self.org_slug.trim().is_empty() {
            return Err(PayloadError::MissingOrgSlug);
        }
        if self.ds_slug.trim().is_empty() {
            return Err(PayloadError::MissingDsSlug);
        }
        Ok(())
    }
}
