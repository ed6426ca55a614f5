// src/exec/service.rs

//! Execution service: a submission queue plus an active set.
//!
//! Both maps live behind one mutex that is only held for bookkeeping, never
//! while an executor call is in flight. A service is driven by [`run`],
//! which pulls queued jobs one at a time until [`stop`] is called.
//!
//! [`run`]: ExecutionService::run
//! [`stop`]: ExecutionService::stop

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, trace, warn};

use crate::dag::ExecutionRequest;
use crate::errors::{FlowError, Result};
use crate::exec::collect::OutputCollector;
use crate::exec::executor::{ExecutionResult, TaskExecutor};
use crate::exec::job::{Job, JobId, JobOutcome, JobState, JobStatus};

/// Linear backoff for [`ExecutionService::wait`]: the n-th sleep lasts
/// `n * unit`, capped at `ceiling * unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub unit: Duration,
    pub ceiling: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            ceiling: 60,
        }
    }
}

impl WaitOptions {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.unit * attempt.clamp(1, self.ceiling.max(1))
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    next_id: JobId,
    queue: VecDeque<Job>,
    active: HashMap<JobId, Job>,
    fault: Option<String>,
}

#[derive(Debug)]
pub struct ExecutionService {
    name: String,
    state: Mutex<ServiceState>,
    running: AtomicBool,
    wait_options: WaitOptions,
    poll_interval: Duration,
}

impl ExecutionService {
    pub fn new(name: impl Into<String>, wait_options: WaitOptions, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ServiceState::default()),
            running: AtomicBool::new(true),
            wait_options,
            poll_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServiceState>> {
        self.state
            .lock()
            .map_err(|_| FlowError::ServiceFault(format!("{}: state lock poisoned", self.name)))
    }

    /// Enqueue a request and return its job id immediately.
    pub fn submit(&self, request: ExecutionRequest) -> Result<JobId> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let id = state.next_id;
        debug!(service = %self.name, job = id, task = %request.task_id, "job submitted");
        state.queue.push_back(Job::new(id, request));
        Ok(id)
    }

    /// Move the oldest queued job into the active set, marking it running.
    pub fn get_queued(&self) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        let Some(mut job) = state.queue.pop_front() else {
            return Ok(None);
        };
        job.state = Some(JobState::Running);
        job.started_at = Some(Utc::now());
        state.active.insert(job.id, job.clone());
        Ok(Some(job))
    }

    /// `Waiting` while queued, the job's own state while active, otherwise
    /// `Unknown`.
    pub fn status(&self, id: JobId) -> Result<JobStatus> {
        let state = self.lock()?;
        if state.queue.iter().any(|j| j.id == id) {
            return Ok(JobStatus::Waiting);
        }
        Ok(state.active.get(&id).map_or(JobStatus::Unknown, Job::status))
    }

    /// Snapshot of a queued or active job.
    pub fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let state = self.lock()?;
        Ok(state
            .active
            .get(&id)
            .or_else(|| state.queue.iter().find(|j| j.id == id))
            .cloned())
    }

    /// Record the executor's result for an active job.
    pub fn finish(&self, id: JobId, result: ExecutionResult) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .active
            .get_mut(&id)
            .ok_or_else(|| FlowError::ServiceFault(format!("{}: job {id} is not active", self.name)))?;
        job.state = Some(if result.is_success() {
            JobState::Ok
        } else {
            JobState::Error
        });
        job.finished_at = Some(Utc::now());
        job.result = Some(result);
        Ok(())
    }

    /// Mark an active job as failed with `message`.
    pub fn set_error(&self, id: JobId, message: &str) -> Result<()> {
        self.finish(id, ExecutionResult::failed(message))
    }

    /// Remove a finished job from the active set. Each id is handed out at
    /// most once; later calls and status queries see it as unknown.
    fn take_finished(&self, id: JobId) -> Result<Option<Job>> {
        let mut state = self.lock()?;
        let finished = state
            .active
            .get(&id)
            .is_some_and(|j| matches!(j.state, Some(JobState::Ok | JobState::Error)));
        Ok(if finished { state.active.remove(&id) } else { None })
    }

    pub fn queued_len(&self) -> Result<usize> {
        Ok(self.lock()?.queue.len())
    }

    /// Flag an unrecoverable condition. Every later `wait` fails at once.
    pub fn set_fault(&self, message: impl Into<String>) {
        let message = message.into();
        error!(service = %self.name, fault = %message, "execution service fault");
        match self.state.lock() {
            Ok(mut state) => state.fault = Some(message),
            Err(poisoned) => poisoned.into_inner().fault = Some(message),
        }
        self.stop();
    }

    pub fn in_error(&self) -> Result<Option<String>> {
        Ok(self.lock()?.fault.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the run loop to exit after its current job. In-flight executor
    /// calls are not interrupted.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(service = %self.name, "execution service stopping");
        }
    }

    /// Pull and execute queued jobs until stopped.
    pub async fn run(self: Arc<Self>, executor: Arc<dyn TaskExecutor>) -> Result<()> {
        info!(service = %self.name, "execution service started");

        while self.is_running() {
            let job = match self.get_queued() {
                Ok(job) => job,
                Err(err) => {
                    self.set_fault(err.to_string());
                    return Err(err);
                }
            };

            let Some(job) = job else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            let id = job.id;
            let task_id = job.request.task_id.clone();
            debug!(service = %self.name, job = id, task = %task_id, "executing job");

            match executor.execute(job.request).await {
                Ok(result) => {
                    if let Some(err) = &result.error {
                        warn!(service = %self.name, job = id, task = %task_id, error = %err, "job failed");
                    }
                    self.finish(id, result)?;
                }
                Err(err) => {
                    let message = format!("executor error on job {id} ({task_id}): {err}");
                    self.set_error(id, &message)?;
                    self.set_fault(message);
                    return Err(err);
                }
            }
        }

        let left = self.queued_len()?;
        if left > 0 {
            self.set_fault(format!("stopped with {left} queued jobs"));
        }
        info!(service = %self.name, "execution service stopped");
        Ok(())
    }

    /// Poll until every job in `jobs` is terminal, with linear backoff.
    ///
    /// Successful jobs have their outputs handed to `collector`, once per
    /// job id. Fails immediately if the service reports a fault.
    pub async fn wait(
        &self,
        jobs: &[JobId],
        collector: &dyn OutputCollector,
    ) -> Result<BTreeMap<JobId, JobOutcome>> {
        let mut outcomes: BTreeMap<JobId, JobOutcome> = BTreeMap::new();
        let mut attempt: u32 = 0;

        loop {
            if let Some(fault) = self.in_error()? {
                return Err(FlowError::ServiceFault(format!("{}: {fault}", self.name)));
            }

            for &id in jobs {
                if outcomes.contains_key(&id) {
                    continue;
                }
                match self.status(id)? {
                    JobStatus::Ok | JobStatus::Error => {
                        let outcome = match self.take_finished(id)? {
                            Some(job) => self.settle(job, collector)?,
                            None => JobOutcome::Unknown,
                        };
                        outcomes.insert(id, outcome);
                    }
                    JobStatus::Unknown => {
                        outcomes.insert(id, JobOutcome::Unknown);
                    }
                    JobStatus::Waiting | JobStatus::Running => {}
                }
            }

            if jobs.iter().all(|id| outcomes.contains_key(id)) {
                return Ok(outcomes);
            }

            attempt = attempt.saturating_add(1);
            let delay = self.wait_options.delay(attempt);
            trace!(service = %self.name, attempt, ?delay, "jobs still pending; backing off");
            tokio::time::sleep(delay).await;
        }
    }

    fn settle(&self, job: Job, collector: &dyn OutputCollector) -> Result<JobOutcome> {
        match &job.result {
            Some(result) if result.is_success() => {
                collector.collect(&job, result)?;
                result.remove_scratch();
                debug!(service = %self.name, job = job.id, outputs = result.outputs.len(), "job outputs collected");
                Ok(JobOutcome::Ok(result.clone()))
            }
            _ => Ok(JobOutcome::Error(
                job.error().unwrap_or("job finished without a result").to_string(),
            )),
        }
    }
}
