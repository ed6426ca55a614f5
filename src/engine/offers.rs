// src/engine/offers.rs

//! Adapter for offer-based cluster backends.
//!
//! The backend offers resources on named hosts. For each offer the adapter
//! asks the scheduler for a task local to that host, submits it to an
//! execution service and hands back a [`PlacementRequest`] for the backend
//! to launch. The backend later reports what happened through
//! [`OfferScheduler::status_update`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::artifact::{ArtifactId, ArtifactRef};
use crate::dag::{ExecutionRequest, TaskId};
use crate::errors::{FlowError, Result};
use crate::exec::{ExecutionResult, ExecutionService, JobId, JobOutcome, OutputCollector};
use crate::scheduler::{Host, SharedScheduler};
use crate::store::{ArtifactStore, JobRecord};

/// Resources each placement claims from an offer.
pub const CPU_SLICE: f64 = 1.0;
pub const MEM_SLICE_MB: u64 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOffer {
    pub offer_id: String,
    pub host: Host,
    pub cpus: f64,
    pub mem_mb: u64,
}

/// A task the backend should launch against an accepted offer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub offer_id: String,
    pub host: Host,
    pub job_id: JobId,
    pub cpus: f64,
    pub mem_mb: u64,
    pub request: ExecutionRequest,
}

impl PlacementRequest {
    /// Backend-visible name: `flowgraph:<task>:<host>`.
    pub fn name(&self) -> String {
        format!("flowgraph:{}:{}", self.request.task_id, self.host)
    }
}

/// What the backend reports about a placement.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementUpdate {
    Running { job_id: JobId },
    Finished { job_id: JobId, result: ExecutionResult },
    Failed { job_id: JobId, message: String },
    /// The host finished scanning its local files and holds these artifacts.
    FileScan { host: Host, found: Vec<ArtifactId> },
}

#[derive(Debug, Clone)]
struct Placement {
    host: Host,
    task_id: TaskId,
    inputs: BTreeMap<String, ArtifactId>,
}

pub struct OfferScheduler {
    scheduler: SharedScheduler,
    service: Arc<ExecutionService>,
    collector: Arc<dyn OutputCollector>,
    store: Option<Arc<dyn ArtifactStore>>,
    /// Upper bound on placements in flight across all hosts.
    max_servers: usize,
    placed: HashMap<JobId, Placement>,
}

impl OfferScheduler {
    pub fn new(
        scheduler: SharedScheduler,
        service: Arc<ExecutionService>,
        collector: Arc<dyn OutputCollector>,
        max_servers: usize,
    ) -> Self {
        Self {
            scheduler,
            service,
            collector,
            store: None,
            max_servers,
            placed: HashMap::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.placed.len()
    }

    fn host_busy(&self, host: &str) -> bool {
        self.placed.values().any(|p| p.host == host)
    }

    /// Turn offers into placements. Offers that are too small, that name a
    /// host already running something, or that arrive while `max_servers`
    /// placements are in flight are declined (no placement returned).
    pub fn resource_offers(&mut self, offers: Vec<ResourceOffer>) -> Result<Vec<PlacementRequest>> {
        debug!(offers = offers.len(), "got resource offers");
        let mut placements = Vec::new();

        for offer in offers {
            if self.placed.len() >= self.max_servers {
                debug!(offer = %offer.offer_id, max_servers = self.max_servers, "server cap reached; declining");
                continue;
            }
            if offer.cpus < CPU_SLICE || offer.mem_mb < MEM_SLICE_MB || self.host_busy(&offer.host) {
                continue;
            }

            let Some(task) = self.scheduler.get_task(&offer.host)? else {
                continue;
            };

            let request = task.to_execution_request();
            let job_id = self.service.submit(request.clone())?;
            // Jobs run remotely, so they go straight to the active set.
            if self.service.get_queued()?.map(|j| j.id) != Some(job_id) {
                return Err(FlowError::ServiceFault(format!(
                    "job {job_id} was not at the head of the queue"
                )));
            }

            info!(task = %task.task_id, host = %offer.host, job = job_id, "placing task on offer");
            self.placed.insert(
                job_id,
                Placement {
                    host: offer.host.clone(),
                    task_id: task.task_id.clone(),
                    inputs: request.inputs.clone(),
                },
            );
            placements.push(PlacementRequest {
                offer_id: offer.offer_id,
                host: offer.host,
                job_id,
                cpus: CPU_SLICE,
                mem_mb: MEM_SLICE_MB,
                request,
            });
        }

        Ok(placements)
    }

    /// Apply a backend status report.
    pub async fn status_update(&mut self, update: PlacementUpdate) -> Result<()> {
        match update {
            PlacementUpdate::Running { job_id } => {
                debug!(job = job_id, "placement running");
                Ok(())
            }
            PlacementUpdate::Finished { job_id, result } => {
                if !self.is_placed(job_id) {
                    return Ok(());
                }
                self.service.finish(job_id, result)?;
                self.settle(job_id).await
            }
            PlacementUpdate::Failed { job_id, message } => {
                if !self.is_placed(job_id) {
                    return Ok(());
                }
                self.service.set_error(job_id, &message)?;
                self.settle(job_id).await
            }
            PlacementUpdate::FileScan { host, found } => {
                for id in found {
                    self.scheduler.add_data_location(id, &host)?;
                }
                Ok(())
            }
        }
    }

    fn is_placed(&self, job_id: JobId) -> bool {
        let placed = self.placed.contains_key(&job_id);
        if !placed {
            warn!(job = job_id, "status update for unknown placement");
        }
        placed
    }

    async fn settle(&mut self, job_id: JobId) -> Result<()> {
        let Some(placement) = self.placed.remove(&job_id) else {
            return Ok(());
        };

        let mut outcomes = self.service.wait(&[job_id], self.collector.as_ref()).await?;
        match outcomes.remove(&job_id) {
            Some(JobOutcome::Ok(result)) => {
                let record = JobRecord::new(placement.inputs, result.visible_outputs());
                self.scheduler
                    .complete_task(&placement.host, &placement.task_id, record)
            }
            Some(JobOutcome::Error(message)) => {
                self.scheduler.fail_task(&placement.task_id, &message)
            }
            Some(JobOutcome::Unknown) | None => self
                .scheduler
                .fail_task(&placement.task_id, &format!("job {job_id} was lost")),
        }
    }

    /// Artifacts READY tasks need at `host` that the store can vouch for.
    /// Backends without their own file scan can call this before offering.
    pub fn file_scan(&self, host: &str) -> Result<Vec<ArtifactId>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let found: Vec<ArtifactId> = self
            .scheduler
            .missing_inputs(host)?
            .into_iter()
            .filter(|id| store.exists(&ArtifactRef::new(*id)))
            .collect();
        for id in &found {
            self.scheduler.add_data_location(*id, host)?;
        }
        Ok(found)
    }
}
