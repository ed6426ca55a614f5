// src/scheduler/shared.rs

//! A cloneable handle that lets worker threads share one [`Scheduler`].
//!
//! Every call takes the lock for the duration of the in-memory bookkeeping
//! only. Callers must not hold a [`SharedScheduler`] guard across task
//! execution; the handle's methods make that impossible by construction.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::artifact::ArtifactId;
use crate::dag::{Task, TaskId};
use crate::errors::{FlowError, Result};
use crate::scheduler::core::Scheduler;
use crate::scheduler::locality::Host;
use crate::scheduler::step::{ActivationReport, SchedulerSummary};
use crate::store::JobRecord;

#[derive(Debug, Clone)]
pub struct SharedScheduler {
    inner: Arc<Mutex<Scheduler>>,
}

impl SharedScheduler {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Scheduler>> {
        self.inner
            .lock()
            .map_err(|_| FlowError::SchedulerFault("scheduler lock poisoned".to_string()))
    }

    /// Run `f` with exclusive access. Keep `f` short.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> Result<R> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn activate_tasks(&self, max_dags: usize) -> Result<ActivationReport> {
        self.lock()?.activate_tasks(max_dags)
    }

    pub fn get_task(&self, host: &str) -> Result<Option<Task>> {
        self.lock()?.get_task(host)
    }

    pub fn get_task_locality(&self, task_id: &str) -> Result<BTreeMap<Host, f64>> {
        self.lock()?.get_task_locality(task_id)
    }

    pub fn add_data_location(&self, id: ArtifactId, host: &str) -> Result<()> {
        self.lock()?.add_data_location(id, host);
        Ok(())
    }

    pub fn complete_task(&self, host: &str, task_id: &str, record: JobRecord) -> Result<()> {
        self.lock()?.complete_task(host, task_id, record)
    }

    pub fn fail_task(&self, task_id: &str, message: &str) -> Result<()> {
        self.lock()?.fail_task(task_id, message)
    }

    pub fn is_done(&self) -> Result<bool> {
        Ok(self.lock()?.is_done())
    }

    pub fn missing_inputs(&self, host: &str) -> Result<BTreeSet<ArtifactId>> {
        Ok(self.lock()?.missing_inputs(host))
    }

    pub fn blocked_tasks(&self) -> Result<Vec<TaskId>> {
        Ok(self.lock()?.blocked_tasks())
    }

    pub fn summary(&self) -> Result<SchedulerSummary> {
        Ok(self.lock()?.summary())
    }

    /// Snapshot of one task.
    pub fn task(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.lock()?.task(task_id).cloned())
    }
}
