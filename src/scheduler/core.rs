// src/scheduler/core.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::artifact::ArtifactId;
use crate::dag::{Dag, DagId, DagSet, Task, TaskId};
use crate::errors::{FlowError, Result};
use crate::scheduler::locality::{Host, LocalityIndex};
use crate::scheduler::step::{ActivationReport, SchedulerSummary};
use crate::store::{JobRecord, JobRecordStore};
use crate::types::{LocalityPolicy, TaskState};

const READY: &[TaskState] = &[TaskState::Ready];

/// Tunables for a [`Scheduler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// How many Dags a single activation scan may admit for the first time.
    /// 0 means no cap.
    pub max_dags: usize,
    pub locality: LocalityPolicy,
}

/// Scheduler owns the compiled [`DagSet`] plus all mutable run state.
///
/// It is responsible for:
/// - promoting tasks whose dependencies are done (`activate_tasks`)
/// - skipping tasks with a matching job record (memoization)
/// - handing ready tasks to hosts that already hold their inputs
/// - recording completions, failures and data locations
///
/// Nothing here blocks; callers share it behind a lock and never hold that
/// lock while a task executes.
pub struct Scheduler {
    dags: DagSet,
    job_records: Box<dyn JobRecordStore>,
    locality: LocalityIndex,
    /// Tasks that are READY or RUNNING, with the Dag holding them.
    active_tasks: BTreeMap<TaskId, DagId>,
    task_index: HashMap<TaskId, DagId>,
    /// Dags admitted by an earlier scan that still have work queued,
    /// executing or promotable. These are never subject to the admission
    /// cap, even after one of their tasks has failed.
    admitted: BTreeSet<DagId>,
    options: SchedulerOptions,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("dags", &self.dags.len())
            .field("active_tasks", &self.active_tasks)
            .field("admitted", &self.admitted)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        dags: DagSet,
        job_records: Box<dyn JobRecordStore>,
        options: SchedulerOptions,
    ) -> Self {
        let task_index = dags
            .iter()
            .flat_map(|d| d.tasks.keys().map(move |id| (id.clone(), d.dag_id)))
            .collect();

        Self {
            dags,
            job_records,
            locality: LocalityIndex::new(),
            active_tasks: BTreeMap::new(),
            task_index,
            admitted: BTreeSet::new(),
            options,
        }
    }

    pub fn dag_set(&self) -> &DagSet {
        &self.dags
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub fn locality_index(&self) -> &LocalityIndex {
        &self.locality
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        let dag_id = self.task_index.get(task_id)?;
        self.dags.dag(*dag_id)?.task(task_id)
    }

    /// Ids of tasks currently READY or RUNNING.
    pub fn active_tasks(&self) -> Vec<TaskId> {
        self.active_tasks.keys().cloned().collect()
    }

    /// Promote eligible PENDING tasks.
    ///
    /// If READY work already exists it is only absorbed into the active set
    /// and nothing new is promoted. Otherwise every PENDING task whose
    /// dependencies are all DONE is either memoized from its job record,
    /// passed through (composite placeholders) or marked READY. Memoized and
    /// passed-through tasks can unlock further tasks, so the scan repeats
    /// until a pass completes nothing.
    pub fn activate_tasks(&mut self, max_dags: usize) -> Result<ActivationReport> {
        let mut report = ActivationReport::default();

        let ready: Vec<(TaskId, DagId)> = self
            .dags
            .get_tasks(Some(READY), 0)
            .into_iter()
            .filter_map(|t| t.dag_id.map(|d| (t.task_id.clone(), d)))
            .collect();
        if !ready.is_empty() {
            for (task_id, dag_id) in ready {
                self.active_tasks.insert(task_id.clone(), dag_id);
                report.absorbed.push(task_id);
            }
            debug!(
                absorbed = report.absorbed.len(),
                "ready work still queued; not activating new tasks"
            );
            return Ok(report);
        }

        let dags = &self.dags;
        self.admitted
            .retain(|id| dags.dag(*id).is_some_and(Dag::has_open_work));

        let mut newly_admitted = 0usize;
        loop {
            let completed_before = report.memoized.len() + report.passed_through.len();

            for dag_id in 0..self.dags.len() {
                let Some(dag) = self.dags.dag(dag_id) else {
                    continue;
                };
                let candidates = dag.eligible();
                if candidates.is_empty() {
                    continue;
                }

                if !self.admitted.contains(&dag_id) {
                    if max_dags > 0 && newly_admitted >= max_dags {
                        debug!(dag = dag_id, max_dags, "dag admission cap reached; deferring");
                        continue;
                    }
                    self.admitted.insert(dag_id);
                    newly_admitted += 1;
                    report.admitted_dags.push(dag_id);
                }

                for task_id in candidates {
                    self.activate_one(dag_id, &task_id, &mut report)?;
                }
                self.refresh_dag(dag_id);
            }

            if report.memoized.len() + report.passed_through.len() == completed_before {
                break;
            }
        }

        if report.changed_anything() {
            info!(
                readied = report.readied.len(),
                memoized = report.memoized.len(),
                passed_through = report.passed_through.len(),
                admitted_dags = report.admitted_dags.len(),
                "activation scan finished"
            );
        }
        Ok(report)
    }

    fn activate_one(
        &mut self,
        dag_id: DagId,
        task_id: &str,
        report: &mut ActivationReport,
    ) -> Result<()> {
        let (active, current, declared) = {
            let task = self.task_ref(dag_id, task_id)?;
            let declared: Vec<String> = task.outputs.keys().cloned().collect();
            (task.is_active(), task.resolved_inputs(), declared)
        };

        if !active {
            self.pass_through(dag_id, task_id)?;
            report.passed_through.push(task_id.to_string());
            return Ok(());
        }

        let record = self.job_records.load(task_id).map_err(|e| {
            FlowError::SchedulerFault(format!("loading job record for '{task_id}': {e:#}"))
        })?;

        match record {
            Some(record)
                if record.matches_inputs(&current) && record.covers_outputs(&declared) =>
            {
                self.task_mut(dag_id, task_id)?.transition(TaskState::Done)?;
                let outputs: BTreeMap<String, ArtifactId> = record
                    .outputs
                    .iter()
                    .map(|(name, r)| (name.clone(), r.id))
                    .collect();
                self.apply_outputs(dag_id, task_id, &outputs)?;
                info!(task = %task_id, dag = dag_id, "job record matches; skipping execution");
                report.memoized.push(task_id.to_string());
            }
            other => {
                if other.is_some() {
                    debug!(task = %task_id, "job record is stale; task must run");
                }
                self.task_mut(dag_id, task_id)?.transition(TaskState::Ready)?;
                self.active_tasks.insert(task_id.to_string(), dag_id);
                debug!(task = %task_id, dag = dag_id, "task ready");
                report.readied.push(task_id.to_string());
            }
        }
        Ok(())
    }

    /// Complete a composite placeholder by exposing each input under the
    /// output of the same name.
    fn pass_through(&mut self, dag_id: DagId, task_id: &str) -> Result<()> {
        let outputs: BTreeMap<String, ArtifactId> = {
            let task = self.task_ref(dag_id, task_id)?;
            let inputs = task.resolved_inputs();
            task.outputs
                .keys()
                .filter_map(|name| match inputs.get(name) {
                    Some(id) => Some((name.clone(), *id)),
                    None => {
                        warn!(task = %task_id, output = %name, "composite output has no matching input");
                        None
                    }
                })
                .collect()
        };

        self.task_mut(dag_id, task_id)?.transition(TaskState::Done)?;
        self.apply_outputs(dag_id, task_id, &outputs)?;
        debug!(task = %task_id, exposed = outputs.len(), "composite passed through");
        Ok(())
    }

    /// Point `task_id`'s output slots, and every downstream reference to
    /// them, at the given ids.
    fn apply_outputs(
        &mut self,
        dag_id: DagId,
        task_id: &str,
        outputs: &BTreeMap<String, ArtifactId>,
    ) -> Result<()> {
        let dag = self
            .dags
            .dag_mut(dag_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;

        let mut remaps = Vec::new();
        {
            let task = dag
                .task_mut(task_id)
                .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;
            for (name, new_id) in outputs {
                match task.outputs.get_mut(name) {
                    Some(slot) if slot.id != *new_id => {
                        remaps.push((slot.id, *new_id));
                        slot.id = *new_id;
                    }
                    Some(_) => {}
                    None => {
                        warn!(task = %task_id, output = %name, "ignoring undeclared output");
                    }
                }
            }
        }

        if remaps.is_empty() {
            return Ok(());
        }
        for dependent in dag.dependents_of(task_id) {
            let Some(downstream) = dag.task_mut(&dependent) else {
                continue;
            };
            for &(old, new) in &remaps {
                if downstream.remap_input(task_id, old, new) > 0 {
                    debug!(
                        task = %dependent,
                        producer = %task_id,
                        %old,
                        %new,
                        "remapped pending input"
                    );
                }
            }
        }
        Ok(())
    }

    /// Hand a READY task to `host`, marking it RUNNING.
    ///
    /// Only tasks whose inputs are all held at `host` (or that have no
    /// inputs) qualify, ties going to the lowest task id. Under
    /// [`LocalityPolicy::Relaxed`] the best partially-local task is taken
    /// when no fully-local one exists.
    pub fn get_task(&mut self, host: &str) -> Result<Option<Task>> {
        if self.dags.get_tasks(Some(READY), 0).is_empty() {
            self.activate_tasks(self.options.max_dags)?;
        }

        let mut ready: Vec<(TaskId, DagId, BTreeSet<ArtifactId>)> = self
            .dags
            .get_tasks(Some(READY), 0)
            .into_iter()
            .filter_map(|t| Some((t.task_id.clone(), t.dag_id?, t.input_ids())))
            .collect();
        ready.sort_by(|a, b| a.0.cmp(&b.0));

        let fraction = |inputs: &BTreeSet<ArtifactId>| {
            if inputs.is_empty() {
                1.0
            } else {
                self.locality.local_count(inputs, host) as f64 / inputs.len() as f64
            }
        };

        let fully_local = ready.iter().find(|(_, _, inputs)| fraction(inputs) >= 1.0);
        let choice = match (fully_local, self.options.locality) {
            (Some(c), _) => Some(c),
            (None, LocalityPolicy::Strict) => None,
            (None, LocalityPolicy::Relaxed) => {
                let mut best: Option<(&(TaskId, DagId, BTreeSet<ArtifactId>), f64)> = None;
                for candidate in &ready {
                    let f = fraction(&candidate.2);
                    if best.is_none_or(|(_, bf)| f > bf) {
                        best = Some((candidate, f));
                    }
                }
                best.map(|(c, _)| c)
            }
        };

        let Some((task_id, dag_id, _)) = choice.cloned() else {
            if !ready.is_empty() {
                debug!(host = %host, ready = ready.len(), "no ready task is local to host");
            }
            return Ok(None);
        };

        let task = self.task_mut(dag_id, &task_id)?;
        task.transition(TaskState::Running)?;
        let snapshot = task.clone();
        self.active_tasks.insert(task_id.clone(), dag_id);
        self.refresh_dag(dag_id);

        info!(task = %task_id, dag = dag_id, host = %host, "task handed to worker");
        Ok(Some(snapshot))
    }

    /// Per-host fraction of the task's distinct inputs held at that host.
    pub fn get_task_locality(&self, task_id: &str) -> Result<BTreeMap<Host, f64>> {
        let task = self
            .task(task_id)
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))?;
        Ok(self.locality.locality(&task.input_ids()))
    }

    pub fn add_data_location(&mut self, id: ArtifactId, host: &str) {
        if self.locality.add(id, host) {
            debug!(artifact = %id, host = %host, "recorded data location");
        }
    }

    /// Record a successful run.
    ///
    /// The job record is persisted before the task is marked DONE, so a store
    /// failure leaves the task RUNNING and surfaces as a scheduler fault.
    pub fn complete_task(&mut self, host: &str, task_id: &str, record: JobRecord) -> Result<()> {
        let dag_id = self.dag_of(task_id)?;
        let state = self.task_ref(dag_id, task_id)?.state;
        if state != TaskState::Running {
            return Err(FlowError::InvalidTransition {
                task: task_id.to_string(),
                from: state,
                to: TaskState::Done,
            });
        }

        self.job_records.save(task_id, &record).map_err(|e| {
            FlowError::SchedulerFault(format!("saving job record for '{task_id}': {e:#}"))
        })?;

        self.task_mut(dag_id, task_id)?.transition(TaskState::Done)?;
        let outputs: BTreeMap<String, ArtifactId> = record
            .outputs
            .iter()
            .map(|(name, r)| (name.clone(), r.id))
            .collect();
        self.apply_outputs(dag_id, task_id, &outputs)?;

        for id in record.output_ids() {
            self.add_data_location(id, host);
        }
        self.active_tasks.remove(task_id);
        self.refresh_dag(dag_id);

        info!(task = %task_id, host = %host, outputs = outputs.len(), "task completed");
        Ok(())
    }

    /// Record a failed run. FAILED is terminal; the task is not retried.
    pub fn fail_task(&mut self, task_id: &str, message: &str) -> Result<()> {
        let dag_id = self.dag_of(task_id)?;
        let task = self.task_mut(dag_id, task_id)?;
        task.transition(TaskState::Failed)?;
        task.error = Some(message.to_string());
        self.active_tasks.remove(task_id);
        self.refresh_dag(dag_id);

        warn!(task = %task_id, error = %message, "task failed");
        Ok(())
    }

    /// True once no task can make further progress: nothing is READY or
    /// RUNNING and no PENDING task has all its dependencies DONE.
    pub fn is_done(&self) -> bool {
        if !self.active_tasks.is_empty()
            || !self
                .dags
                .get_tasks(Some(&[TaskState::Ready, TaskState::Running]), 1)
                .is_empty()
        {
            return false;
        }
        self.dags.iter().all(|d| d.eligible().is_empty())
    }

    /// PENDING tasks with a FAILED task somewhere upstream.
    pub fn blocked_tasks(&self) -> Vec<TaskId> {
        self.dags
            .iter()
            .flat_map(|dag| {
                dag.tasks
                    .values()
                    .filter(|t| t.state == TaskState::Pending && has_failed_upstream(dag, t))
                    .map(|t| t.task_id.clone())
            })
            .collect()
    }

    /// Input ids of READY tasks that `host` is not yet known to hold.
    pub fn missing_inputs(&self, host: &str) -> BTreeSet<ArtifactId> {
        self.dags
            .get_tasks(Some(READY), 0)
            .into_iter()
            .flat_map(|t| t.input_ids())
            .filter(|id| !self.locality.holds(id, host))
            .collect()
    }

    pub fn summary(&self) -> SchedulerSummary {
        let mut summary = SchedulerSummary::default();
        for task in self.dags.iter().flat_map(|d| d.tasks.values()) {
            match task.state {
                TaskState::Pending => summary.pending += 1,
                TaskState::Ready => summary.ready += 1,
                TaskState::Running => summary.running += 1,
                TaskState::Done => summary.done += 1,
                TaskState::Failed => summary.failed += 1,
                TaskState::Unknown => {}
            }
        }
        summary.blocked = self.blocked_tasks().len();
        summary
    }

    fn dag_of(&self, task_id: &str) -> Result<DagId> {
        self.task_index
            .get(task_id)
            .copied()
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))
    }

    fn task_ref(&self, dag_id: DagId, task_id: &str) -> Result<&Task> {
        self.dags
            .dag(dag_id)
            .and_then(|d| d.task(task_id))
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))
    }

    fn task_mut(&mut self, dag_id: DagId, task_id: &str) -> Result<&mut Task> {
        self.dags
            .dag_mut(dag_id)
            .and_then(|d| d.task_mut(task_id))
            .ok_or_else(|| FlowError::TaskNotFound(task_id.to_string()))
    }

    fn refresh_dag(&mut self, dag_id: DagId) {
        if let Some(dag) = self.dags.dag_mut(dag_id) {
            let before = dag.state;
            let after = dag.refresh_state();
            if before != after {
                debug!(dag = dag_id, from = %before, to = %after, "dag state change");
            }
        }
    }
}

fn has_failed_upstream(dag: &Dag, task: &Task) -> bool {
    let mut stack: Vec<&str> = task.dependencies().into_iter().collect();
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(upstream) = dag.task(id) {
            if upstream.state == TaskState::Failed {
                return true;
            }
            stack.extend(upstream.dependencies());
        }
    }
    false
}
