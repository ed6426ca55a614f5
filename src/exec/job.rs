// src/exec/job.rs

//! Jobs: one submission of a task to an execution service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::ExecutionRequest;
use crate::exec::executor::ExecutionResult;

/// Monotonically increasing per service, starting at 1.
pub type JobId = u64;

/// State of a job the service has dequeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Ok,
    Error,
}

/// What `status` reports for a job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Still in the submission queue.
    Waiting,
    Running,
    Ok,
    Error,
    /// Not queued and not active: never submitted, or already collected.
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Ok | JobStatus::Error | JobStatus::Unknown)
    }
}

impl From<JobState> for JobStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Running => JobStatus::Running,
            JobState::Ok => JobStatus::Ok,
            JobState::Error => JobStatus::Error,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Ok => "ok",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub request: ExecutionRequest,
    /// `None` while queued.
    pub state: Option<JobState>,
    pub result: Option<ExecutionResult>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, request: ExecutionRequest) -> Self {
        Self {
            id,
            request,
            state: None,
            result: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.map_or(JobStatus::Waiting, JobStatus::from)
    }

    /// Failure message, if the job ended in error.
    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.error.as_deref())
    }
}

/// Terminal outcome of a job as observed by `wait`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Ok(ExecutionResult),
    Error(String),
    /// The id was unknown to the service when polled.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        for s in [JobStatus::Ok, JobStatus::Error, JobStatus::Unknown] {
            assert!(s.is_terminal(), "{s}");
        }
        assert_eq!(serde_json::to_string(&JobStatus::Waiting).unwrap(), "\"waiting\"");
    }
}
