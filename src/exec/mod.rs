// src/exec/mod.rs

//! Execution layer.
//!
//! - [`executor`] defines the [`TaskExecutor`] contract and the
//!   process-based [`ProcessExecutor`] used in production. Tests can swap in
//!   a fake implementation.
//! - [`job`] holds job ids, states and the statuses services report.
//! - [`service`] owns the submission queue, the active set and the
//!   polling `wait` loop.
//! - [`collect`] decides where outputs of successful jobs end up.

pub mod collect;
pub mod executor;
pub mod job;
pub mod service;

pub use collect::{NullCollector, OutputCollector, StoreCollector};
pub use executor::{ExecutionResult, JobOutput, ProcessExecutor, TaskExecutor};
pub use job::{Job, JobId, JobOutcome, JobState, JobStatus};
pub use service::{ExecutionService, WaitOptions};
