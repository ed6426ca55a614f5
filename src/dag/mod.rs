// src/dag/mod.rs

//! Task graph model and compiler.
//!
//! - [`task`] holds the unit of work, its kind and its state machine.
//! - [`dagset`] holds connected components ([`Dag`]) and the ordered
//!   [`DagSet`] the scheduler scans.
//! - [`compiler`] partitions a flat task list into Dags.
//! - [`group`] stores and loads flat task lists as JSON lines.

pub mod compiler;
pub mod dagset;
pub mod group;
pub mod task;

pub use compiler::GraphCompiler;
pub use dagset::{Dag, DagSet};
pub use group::TaskGroup;
pub use task::{DagId, ExecutionRequest, Task, TaskId, TaskKind};
