// src/engine/worker.rs

//! Per-host pull loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactRef;
use crate::dag::Task;
use crate::errors::{FlowError, Result};
use crate::exec::{ExecutionService, JobOutcome, OutputCollector};
use crate::scheduler::{Host, SharedScheduler};
use crate::store::{ArtifactStore, JobRecord};

use super::WorkerEvent;

/// One worker per host: `get_task` -> submit -> wait -> complete/fail.
///
/// The scheduler lock is only taken inside the `SharedScheduler` calls, so
/// it is never held while the job runs.
pub struct Worker {
    host: Host,
    scheduler: SharedScheduler,
    service: Arc<ExecutionService>,
    collector: Arc<dyn OutputCollector>,
    store: Option<Arc<dyn ArtifactStore>>,
    stop: Arc<AtomicBool>,
    events: mpsc::Sender<WorkerEvent>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        host: impl Into<Host>,
        scheduler: SharedScheduler,
        service: Arc<ExecutionService>,
        collector: Arc<dyn OutputCollector>,
        stop: Arc<AtomicBool>,
        events: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            host: host.into(),
            scheduler,
            service,
            collector,
            store: None,
            stop,
            events,
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Artifact store consulted by the idle file scan.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn run(self) -> Result<()> {
        info!(host = %self.host, "worker started");

        while !self.stop.load(Ordering::SeqCst) {
            match self.scheduler.get_task(&self.host)? {
                Some(task) => self.run_task(task).await?,
                None => {
                    let found = self.file_scan()?;
                    if found == 0 {
                        self.emit(WorkerEvent::Idle {
                            host: self.host.clone(),
                        })
                        .await;
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        info!(host = %self.host, "worker stopped");
        Ok(())
    }

    async fn run_task(&self, task: Task) -> Result<()> {
        let request = task.to_execution_request();
        let inputs = request.inputs.clone();
        let task_id = task.task_id;

        self.emit(WorkerEvent::Started {
            host: self.host.clone(),
            task: task_id.clone(),
        })
        .await;

        let job = self.service.submit(request)?;
        let mut outcomes = self.service.wait(&[job], self.collector.as_ref()).await?;

        match outcomes.remove(&job) {
            Some(JobOutcome::Ok(result)) => {
                let record = JobRecord::new(inputs, result.visible_outputs());
                self.scheduler.complete_task(&self.host, &task_id, record)?;
                self.emit(WorkerEvent::Completed {
                    host: self.host.clone(),
                    task: task_id,
                })
                .await;
            }
            Some(JobOutcome::Error(message)) => {
                self.scheduler.fail_task(&task_id, &message)?;
                self.emit(WorkerEvent::Failed {
                    host: self.host.clone(),
                    task: task_id,
                    message,
                })
                .await;
            }
            Some(JobOutcome::Unknown) | None => {
                let message = format!("job {job} disappeared from service {}", self.service.name());
                warn!(host = %self.host, task = %task_id, %message);
                self.scheduler.fail_task(&task_id, &message)?;
                self.emit(WorkerEvent::Failed {
                    host: self.host.clone(),
                    task: task_id,
                    message,
                })
                .await;
            }
        }
        Ok(())
    }

    /// Record as local every input of a READY task that the store already
    /// holds. Returns how many new locations were found.
    fn file_scan(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut found = 0;
        for id in self.scheduler.missing_inputs(&self.host)? {
            if store.exists(&ArtifactRef::new(id)) {
                self.scheduler.add_data_location(id, &self.host)?;
                found += 1;
            }
        }
        if found > 0 {
            debug!(host = %self.host, found, "file scan found local inputs");
        }
        Ok(found)
    }

    async fn emit(&self, event: WorkerEvent) {
        // The runtime may already have stopped listening during shutdown.
        if self.events.send(event).await.is_err() {
            debug!(host = %self.host, "runtime event channel closed");
        }
    }
}

/// Map a join failure of a spawned worker or service into our error type.
pub(crate) fn join_error(err: tokio::task::JoinError) -> FlowError {
    FlowError::Other(anyhow::anyhow!("background task ended abnormally: {err}"))
}
