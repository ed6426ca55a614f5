// src/dag/task.rs

//! A single unit of work and its data references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::refs::is_valid_task_id;
use crate::artifact::{ArtifactId, InputRef, OutputSlot, PendingRef};
use crate::errors::{CompileError, FlowError, Result};
use crate::types::TaskState;

/// Canonical task id type.
pub type TaskId = String;

/// Index of a Dag inside its [`DagSet`](crate::dag::DagSet).
pub type DagId = usize;

/// The kinds of work a task can describe.
///
/// The scheduler never looks inside these; executors do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// A shell command run on the worker host.
    Shell { command: String },
    /// A command run inside a container image.
    Container { image: String, command: String },
    /// A workflow submitted to a remote workflow engine.
    Workflow { engine: String, workflow: String },
    /// Placeholder exposing the outputs of another compiled sub-graph.
    /// Performs no work of its own.
    Composite { path: PathBuf },
}

/// What an executor receives for a task: its kind plus resolved ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub inputs: BTreeMap<String, ArtifactId>,
    pub outputs: BTreeMap<String, ArtifactId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    /// Set once by the compiler, never changed afterwards.
    pub dag_id: Option<DagId>,
    #[serde(default)]
    pub priority: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message reported by the executor.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputRef>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSlot>,
}

impl Task {
    pub fn new(task_id: impl Into<TaskId>, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            state: TaskState::Pending,
            dag_id: None,
            priority: 0.0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Declare a named output, minting a fresh slot for it.
    ///
    /// Declaring the same name twice keeps the first slot.
    pub fn declare_output(&mut self, name: impl Into<String>) -> &OutputSlot {
        let task_id = self.task_id.clone();
        self.outputs
            .entry(name.into())
            .or_insert_with(|| OutputSlot::new(task_id))
    }

    pub fn add_input(&mut self, name: impl Into<String>, input: InputRef) {
        self.inputs.insert(name.into(), input);
    }

    /// A forward reference to one of this task's outputs, for use as a
    /// downstream input.
    pub fn output_ref(&self, name: &str) -> Result<PendingRef> {
        let slot = self.outputs.get(name).ok_or_else(|| {
            FlowError::from(CompileError::InvalidTask {
                task: self.task_id.clone(),
                reason: format!("no output named '{name}'"),
            })
        })?;
        PendingRef::to_slot(slot)
    }

    /// Tasks this one depends on, derived from its pending inputs.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.inputs.values().filter_map(InputRef::producer).collect()
    }

    /// Current artifact id of every input, by input name.
    pub fn resolved_inputs(&self) -> BTreeMap<String, ArtifactId> {
        self.inputs
            .iter()
            .map(|(name, input)| (name.clone(), input.id()))
            .collect()
    }

    /// Distinct input artifact ids.
    pub fn input_ids(&self) -> BTreeSet<ArtifactId> {
        self.inputs.values().map(InputRef::id).collect()
    }

    /// Composite placeholders do no work; every other kind is active.
    pub fn is_active(&self) -> bool {
        !matches!(self.kind, TaskKind::Composite { .. })
    }

    /// Check that the task is well-formed enough to compile.
    pub fn is_valid(&self) -> std::result::Result<(), CompileError> {
        let invalid = |reason: &str| CompileError::InvalidTask {
            task: self.task_id.clone(),
            reason: reason.to_string(),
        };

        if !is_valid_task_id(&self.task_id) {
            return Err(CompileError::InvalidProducer(self.task_id.clone()));
        }

        match &self.kind {
            TaskKind::Shell { command } if command.trim().is_empty() => {
                Err(invalid("shell task has an empty command"))
            }
            TaskKind::Container { image, .. } if image.trim().is_empty() => {
                Err(invalid("container task has no image"))
            }
            TaskKind::Workflow { engine, workflow }
                if engine.trim().is_empty() || workflow.trim().is_empty() =>
            {
                Err(invalid("workflow task needs both an engine and a workflow"))
            }
            _ => Ok(()),
        }
    }

    pub fn to_execution_request(&self) -> ExecutionRequest {
        ExecutionRequest {
            task_id: self.task_id.clone(),
            kind: self.kind.clone(),
            inputs: self.resolved_inputs(),
            outputs: self
                .outputs
                .iter()
                .map(|(name, slot)| (name.clone(), slot.id))
                .collect(),
        }
    }

    /// Record the Dag this task belongs to. A second, different assignment
    /// is rejected.
    pub fn assign_dag(&mut self, dag_id: DagId) -> std::result::Result<(), CompileError> {
        match self.dag_id {
            Some(existing) if existing != dag_id => Err(CompileError::InvalidTask {
                task: self.task_id.clone(),
                reason: format!("already assigned to dag {existing}"),
            }),
            _ => {
                self.dag_id = Some(dag_id);
                Ok(())
            }
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, to: TaskState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(FlowError::InvalidTransition {
                task: self.task_id.clone(),
                from: self.state,
                to,
            });
        }
        debug!(task = %self.task_id, from = %self.state, to = %to, "task state change");
        match to {
            TaskState::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        self.state = to;
        Ok(())
    }

    /// Point every pending input that currently names `old` (produced by
    /// `producer`) at `new` instead. Returns how many inputs changed.
    pub fn remap_input(&mut self, producer: &str, old: ArtifactId, new: ArtifactId) -> usize {
        let mut changed = 0;
        for input in self.inputs.values_mut() {
            if let InputRef::Pending(p) = input {
                if p.task_id == producer && p.id == old {
                    p.id = new;
                    changed += 1;
                }
            }
        }
        changed
    }
}
