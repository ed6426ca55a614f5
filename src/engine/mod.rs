// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the shared scheduler
//! - one execution service and one pull-loop worker per host
//! - the runtime loop that watches worker events and decides when the run
//!   is over
//!
//! [`offers`] adapts the same scheduler to an offer-based cluster backend
//! instead of local workers.

use std::time::Duration;

use crate::dag::TaskId;
use crate::exec::WaitOptions;
use crate::scheduler::{Host, SchedulerSummary};

/// Events flowing from workers into the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started { host: Host, task: TaskId },
    Completed { host: Host, task: TaskId },
    Failed { host: Host, task: TaskId, message: String },
    /// The host found nothing it could run.
    Idle { host: Host },
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub hosts: Vec<Host>,
    /// Sleep between polls of an idle worker or service.
    pub poll_interval: Duration,
    pub wait: WaitOptions,
    /// Give up when no task has started or finished for this long.
    pub stall_timeout: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            poll_interval: Duration::from_millis(200),
            wait: WaitOptions::default(),
            stall_timeout: None,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub summary: SchedulerSummary,
    /// Failed tasks with their error messages.
    pub failed: Vec<(TaskId, String)>,
    /// PENDING tasks that can never run because something upstream failed.
    pub blocked: Vec<TaskId>,
    /// READY tasks no host could take.
    pub stranded: Vec<TaskId>,
    pub interrupted: bool,
    pub stalled: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.blocked.is_empty()
            && self.stranded.is_empty()
            && !self.interrupted
            && !self.stalled
            && self.summary.pending == 0
    }
}

pub mod offers;
pub mod runtime;
pub mod worker;

pub use offers::{OfferScheduler, PlacementRequest, PlacementUpdate, ResourceOffer};
pub use runtime::{import_sources, Runtime};
pub use worker::Worker;
