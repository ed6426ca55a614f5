use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowgraph::artifact::hash::bytes_uuid;
use flowgraph::dag::ExecutionRequest;
use flowgraph::errors::Result;
use flowgraph::exec::{ExecutionResult, JobOutput, TaskExecutor};

/// A fake executor that:
/// - records which tasks were "run", in order
/// - fails the task ids it was told to fail
/// - otherwise reports every declared output, with an id derived from
///   `"<task>:<output>"` so reruns produce the same artifacts.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    executed: Arc<Mutex<Vec<String>>>,
    failing: BTreeSet<String>,
    delay: Option<Duration>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, task_id: &str) -> Self {
        self.failing.insert(task_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the list of executed task ids.
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    pub fn executed_ids(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// The artifact id this executor reports for `task_id`'s `output`.
    pub fn output_id(task_id: &str, output: &str) -> flowgraph::artifact::ArtifactId {
        bytes_uuid(format!("{task_id}:{output}").as_bytes())
    }
}

impl TaskExecutor for FakeExecutor {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult>> + Send + '_>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.executed.lock().unwrap().push(request.task_id.clone());

            if self.failing.contains(&request.task_id) {
                tracing::debug!(task = %request.task_id, "fake executor failing task");
                return Ok(ExecutionResult::failed(format!(
                    "{} failed on purpose",
                    request.task_id
                )));
            }

            let outputs: BTreeMap<String, JobOutput> = request
                .outputs
                .keys()
                .map(|name| {
                    (
                        name.clone(),
                        JobOutput {
                            artifact: Self::output_id(&request.task_id, name),
                            path: None,
                            visible: true,
                        },
                    )
                })
                .collect();

            tracing::debug!(task = %request.task_id, outputs = outputs.len(), "fake executor ran task");
            Ok(ExecutionResult {
                outputs,
                error: None,
                scratch: None,
            })
        })
    }
}
