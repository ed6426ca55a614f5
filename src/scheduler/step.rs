// src/scheduler/step.rs

//! Result types reported by scheduler operations.

use crate::dag::{DagId, TaskId};

/// What a single `activate_tasks` call did.
///
/// Useful for tests that want to assert exactly which tasks moved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivationReport {
    /// READY tasks that already existed and were absorbed into the active
    /// set instead of scanning for new work.
    pub absorbed: Vec<TaskId>,
    /// Tasks promoted PENDING -> READY.
    pub readied: Vec<TaskId>,
    /// Tasks completed from a matching job record without running.
    pub memoized: Vec<TaskId>,
    /// Composite placeholders completed by exposing their inputs.
    pub passed_through: Vec<TaskId>,
    /// Dags admitted for the first time during this scan.
    pub admitted_dags: Vec<DagId>,
}

impl ActivationReport {
    /// Whether the scan changed any task state.
    pub fn changed_anything(&self) -> bool {
        !(self.readied.is_empty() && self.memoized.is_empty() && self.passed_through.is_empty())
    }
}

/// Task counts by state, for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    /// PENDING tasks that can never run because something upstream failed.
    pub blocked: usize,
}
