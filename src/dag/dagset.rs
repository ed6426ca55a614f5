// src/dag/dagset.rs

//! Dags and the ordered collection the scheduler works over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dag::task::{DagId, Task, TaskId};
use crate::errors::CompileError;
use crate::types::TaskState;

/// States used when a query does not name any.
const DEFAULT_STATES: &[TaskState] = &[TaskState::Running];

/// One maximal connected component of the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub dag_id: DagId,
    pub state: TaskState,
    pub tasks: BTreeMap<TaskId, Task>,
}

impl Dag {
    fn new(
        dag_id: DagId,
        mut tasks: BTreeMap<TaskId, Task>,
    ) -> std::result::Result<Self, CompileError> {
        for task in tasks.values_mut() {
            task.assign_dag(dag_id)?;
        }
        let mut dag = Self {
            dag_id,
            state: TaskState::Pending,
            tasks,
        };
        dag.refresh_state();
        Ok(dag)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    /// Tasks in one of `states` (RUNNING when `None`), at most `limit`
    /// of them (0 = unlimited), in task id order.
    pub fn get_tasks(&self, states: Option<&[TaskState]>, limit: usize) -> Vec<&Task> {
        let states = states.unwrap_or(DEFAULT_STATES);
        self.tasks
            .values()
            .filter(|t| states.contains(&t.state))
            .take(if limit == 0 { usize::MAX } else { limit })
            .collect()
    }

    /// Tasks with a pending input produced by `task_id`.
    pub fn dependents_of(&self, task_id: &str) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.dependencies().contains(task_id))
            .map(|t| t.task_id.clone())
            .collect()
    }

    fn deps_done(&self, task: &Task) -> bool {
        task.dependencies()
            .iter()
            .all(|dep| self.task(dep).is_some_and(|t| t.state == TaskState::Done))
    }

    /// PENDING tasks whose dependencies are all DONE, in id order.
    pub fn eligible(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.state == TaskState::Pending && self.deps_done(t))
            .map(|t| t.task_id.clone())
            .collect()
    }

    /// Whether anything here is queued, executing or can still be promoted.
    pub fn has_open_work(&self) -> bool {
        self.tasks
            .values()
            .any(|t| matches!(t.state, TaskState::Ready | TaskState::Running))
            || !self.eligible().is_empty()
    }

    /// Recompute the Dag's state from its tasks.
    ///
    /// - every task DONE: DONE
    /// - any READY or RUNNING task, or a PENDING one that can be promoted
    ///   after something started: RUNNING
    /// - otherwise any FAILED task: FAILED
    /// - otherwise some progress made: RUNNING
    /// - nothing started yet: PENDING
    pub fn refresh_state(&mut self) -> TaskState {
        let started = self.tasks.values().any(|t| t.state != TaskState::Pending);
        let active = self
            .tasks
            .values()
            .any(|t| matches!(t.state, TaskState::Ready | TaskState::Running));

        self.state = if self.tasks.values().all(|t| t.state == TaskState::Done) {
            TaskState::Done
        } else if active || (started && !self.eligible().is_empty()) {
            TaskState::Running
        } else if self.tasks.values().any(|t| t.state == TaskState::Failed) {
            TaskState::Failed
        } else if started {
            TaskState::Running
        } else {
            TaskState::Pending
        };
        self.state
    }
}

/// Ordered collection of Dags. A Dag's id is its position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DagSet {
    dags: Vec<Dag>,
}

impl DagSet {
    pub fn new() -> Self {
        Self { dags: Vec::new() }
    }

    /// Append a component; its id is the number of Dags already present.
    pub fn append(
        &mut self,
        tasks: BTreeMap<TaskId, Task>,
    ) -> std::result::Result<DagId, CompileError> {
        let dag_id = self.dags.len();
        self.dags.push(Dag::new(dag_id, tasks)?);
        Ok(dag_id)
    }

    pub fn len(&self) -> usize {
        self.dags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dag> {
        self.dags.iter()
    }

    pub fn dag(&self, dag_id: DagId) -> Option<&Dag> {
        self.dags.get(dag_id)
    }

    pub fn dag_mut(&mut self, dag_id: DagId) -> Option<&mut Dag> {
        self.dags.get_mut(dag_id)
    }

    /// Linear scan over every Dag's tasks.
    pub fn get_tasks(&self, states: Option<&[TaskState]>, limit: usize) -> Vec<&Task> {
        let states = states.unwrap_or(DEFAULT_STATES);
        self.dags
            .iter()
            .flat_map(|d| d.tasks.values())
            .filter(|t| states.contains(&t.state))
            .take(if limit == 0 { usize::MAX } else { limit })
            .collect()
    }

    /// Linear scan over the Dags themselves, filtered by Dag state.
    pub fn get_dags(&self, states: Option<&[TaskState]>, limit: usize) -> Vec<&Dag> {
        let states = states.unwrap_or(DEFAULT_STATES);
        self.dags
            .iter()
            .filter(|d| states.contains(&d.state))
            .take(if limit == 0 { usize::MAX } else { limit })
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.dags.iter().map(|d| d.tasks.len()).sum()
    }

    /// Locate a task by id.
    pub fn find_task(&self, task_id: &str) -> Option<&Task> {
        self.dags.iter().find_map(|d| d.task(task_id))
    }
}
