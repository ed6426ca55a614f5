// src/scheduler/mod.rs

//! Task activation, placement and completion bookkeeping.

pub mod core;
pub mod locality;
pub mod shared;
pub mod step;

pub use self::core::{Scheduler, SchedulerOptions};
pub use locality::{Host, LocalityIndex};
pub use shared::SharedScheduler;
pub use step::{ActivationReport, SchedulerSummary};
