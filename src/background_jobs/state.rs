use serde::Serialize;

/// Lifecycle state of a job in the engine, mirrored by name into the job index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Created,
    Enqueued,
    Scheduled,
    Processing,
    Awaiting,
    Succeeded,
    Failed,
    Deleted,
}

impl JobState {
    pub const ACTIVE: [JobState; 5] = [
        JobState::Created,
        JobState::Enqueued,
        JobState::Processing,
        JobState::Scheduled,
        JobState::Awaiting,
    ];

    pub const TERMINAL: [JobState; 3] = [JobState::Succeeded, JobState::Failed, JobState::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "Created",
            JobState::Enqueued => "Enqueued",
            JobState::Scheduled => "Scheduled",
            JobState::Processing => "Processing",
            JobState::Awaiting => "Awaiting",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
            JobState::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Created" => Some(JobState::Created),
            "Enqueued" => Some(JobState::Enqueued),
            "Scheduled" => Some(JobState::Scheduled),
            "Processing" => Some(JobState::Processing),
            "Awaiting" => Some(JobState::Awaiting),
            "Succeeded" => Some(JobState::Succeeded),
            "Failed" => Some(JobState::Failed),
            "Deleted" => Some(JobState::Deleted),
            _ => None,
        }
    }

    /// A terminal job never transitions again.
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Active jobs are the ones eligible for cancellation.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
