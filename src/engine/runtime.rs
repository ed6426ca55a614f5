// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactRef, InputRef};
use crate::dag::{DagSet, TaskId};
use crate::errors::{FlowError, Result};
use crate::exec::{ExecutionService, OutputCollector, TaskExecutor};
use crate::scheduler::{Host, SharedScheduler};
use crate::store::ArtifactStore;
use crate::types::TaskState;

use super::worker::{join_error, Worker};
use super::{RunReport, RuntimeOptions, WorkerEvent};

/// Spawns one execution service and one worker per host, then watches
/// worker events until the scheduler has nothing left to do.
pub struct Runtime {
    scheduler: SharedScheduler,
    executor: Arc<dyn TaskExecutor>,
    collector: Arc<dyn OutputCollector>,
    store: Option<Arc<dyn ArtifactStore>>,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        scheduler: SharedScheduler,
        executor: Arc<dyn TaskExecutor>,
        collector: Arc<dyn OutputCollector>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            executor,
            collector,
            store: None,
            options,
        }
    }

    /// Artifact store workers scan for inputs while idle.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Main loop.
    ///
    /// - Spawns a service plus a worker for every configured host.
    /// - Consumes `WorkerEvent`s, checking after each one whether any task
    ///   can still make progress.
    /// - Stops everything on completion, stall, Ctrl-C or a worker error.
    ///
    /// A stall is either the configured stall timeout running out, or every
    /// host reporting idle twice since the last start or finish while no
    /// task is running.
    pub async fn run(self) -> Result<RunReport> {
        if self.options.hosts.is_empty() {
            return Err(FlowError::ConfigError("no worker hosts configured".into()));
        }
        info!(hosts = ?self.options.hosts, "flowgraph runtime started");

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(256);
        let mut services = Vec::new();
        let mut handles: JoinSet<Result<()>> = JoinSet::new();

        for host in &self.options.hosts {
            let service = Arc::new(ExecutionService::new(
                host.clone(),
                self.options.wait,
                self.options.poll_interval,
            ));
            handles.spawn(service.clone().run(self.executor.clone()));

            let mut worker = Worker::new(
                host.clone(),
                self.scheduler.clone(),
                service.clone(),
                self.collector.clone(),
                stop.clone(),
                tx.clone(),
            )
            .with_poll_interval(self.options.poll_interval);
            if let Some(store) = &self.store {
                worker = worker.with_store(store.clone());
            }
            handles.spawn(worker.run());
            services.push(service);
        }
        drop(tx);

        let mut last_progress = Instant::now();
        let mut idle_reports: BTreeMap<Host, u32> = BTreeMap::new();
        let mut interrupted = false;
        let mut stalled = false;
        let mut failure: Option<FlowError> = None;

        loop {
            if self.scheduler.is_done()? {
                debug!("no task can make further progress");
                break;
            }

            tokio::select! {
                event = rx.recv() => match event {
                    Some(WorkerEvent::Idle { host }) => {
                        if let Some(limit) = self.options.stall_timeout {
                            if last_progress.elapsed() >= limit {
                                warn!(host = %host, ?limit, "no progress within stall timeout");
                                stalled = true;
                                break;
                            }
                        }
                        *idle_reports.entry(host).or_default() += 1;
                        if self.all_hosts_idle(&idle_reports)? {
                            warn!(
                                stranded = self.scheduler.summary()?.ready,
                                "every host is idle and nothing is running"
                            );
                            stalled = true;
                            break;
                        }
                    }
                    Some(event) => {
                        debug!(?event, "runtime received event");
                        last_progress = Instant::now();
                        idle_reports.clear();
                    }
                    None => {
                        info!("worker event channel closed; exiting");
                        break;
                    }
                },
                joined = handles.join_next() => match joined {
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        failure = Some(err);
                        break;
                    }
                    Some(Err(err)) => {
                        failure = Some(join_error(err));
                        break;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received; shutting down");
                    interrupted = true;
                    break;
                }
            }
        }

        stop.store(true, Ordering::SeqCst);
        for service in &services {
            service.stop();
        }
        if interrupted || failure.is_some() {
            // Dropping in-flight executor futures kills their processes.
            handles.abort_all();
        }
        while let Some(joined) = handles.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(join_error(err));
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let report = self.report(interrupted, stalled)?;
        info!(
            done = report.summary.done,
            failed = report.summary.failed,
            blocked = report.summary.blocked,
            "runtime exiting"
        );
        Ok(report)
    }

    /// Each host has come up empty at least twice since the last start or
    /// finish, and the scheduler has nothing RUNNING. One report per host
    /// may predate a completion elsewhere; the second cannot.
    fn all_hosts_idle(&self, idle_reports: &BTreeMap<Host, u32>) -> Result<bool> {
        let every_host = self
            .options
            .hosts
            .iter()
            .all(|h| idle_reports.get(h).is_some_and(|n| *n >= 2));
        if !every_host {
            return Ok(false);
        }
        self.scheduler.with(|s| {
            s.dag_set()
                .get_tasks(Some(&[TaskState::Running]), 1)
                .is_empty()
        })
    }

    fn report(&self, interrupted: bool, stalled: bool) -> Result<RunReport> {
        let (summary, failed, stranded) = self.scheduler.with(|s| {
            let failed: Vec<(TaskId, String)> = s
                .dag_set()
                .get_tasks(Some(&[TaskState::Failed]), 0)
                .into_iter()
                .map(|t| (t.task_id.clone(), t.error.clone().unwrap_or_default()))
                .collect();
            let stranded: Vec<TaskId> = s
                .dag_set()
                .get_tasks(Some(&[TaskState::Ready]), 0)
                .into_iter()
                .map(|t| t.task_id.clone())
                .collect();
            (s.summary(), failed, stranded)
        })?;

        Ok(RunReport {
            summary,
            failed,
            blocked: self.scheduler.blocked_tasks()?,
            stranded,
            interrupted,
            stalled,
        })
    }
}

/// Copy every source file referenced by the graph into `store` so that
/// workers can discover it. Returns how many files were imported.
pub fn import_sources(dags: &DagSet, store: &dyn ArtifactStore) -> Result<usize> {
    let mut imported = 0;
    for task in dags.iter().flat_map(|d| d.tasks.values()) {
        for input in task.inputs.values() {
            let InputRef::Source(source) = input else {
                continue;
            };
            let artifact = ArtifactRef::new(source.id);
            if store.exists(&artifact) {
                continue;
            }
            store.update_from_file(&artifact, &source.path, true)?;
            imported += 1;
        }
    }
    if imported > 0 {
        info!(imported, "imported source files into artifact store");
    }
    Ok(imported)
}
