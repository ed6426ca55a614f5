use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by tasks and Dags.
///
/// Valid task transitions are `Pending -> Ready -> Running -> {Done, Failed}`
/// plus the memoization shortcut `Pending -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    /// Whether moving from `self` to `to` is a legal task transition.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Pending, TaskState::Ready)
                | (TaskState::Pending, TaskState::Done)
                | (TaskState::Ready, TaskState::Running)
                | (TaskState::Running, TaskState::Done)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Done => "DONE",
            TaskState::Failed => "FAILED",
            TaskState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// How strictly `get_task` insists on data locality.
///
/// - `Strict`: only hand out tasks whose inputs are all present at the
///   requesting host (or that have no inputs). Default.
/// - `Relaxed`: if no READY task is fully local, fall back to the READY task
///   with the best locality score at that host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalityPolicy {
    #[default]
    Strict,
    Relaxed,
}

impl FromStr for LocalityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(LocalityPolicy::Strict),
            "relaxed" => Ok(LocalityPolicy::Relaxed),
            other => Err(format!(
                "invalid locality policy: {other} (expected \"strict\" or \"relaxed\")"
            )),
        }
    }
}
