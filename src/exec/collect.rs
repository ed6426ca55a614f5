// src/exec/collect.rs

//! Where successful job outputs go.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use crate::artifact::ArtifactRef;
use crate::exec::executor::ExecutionResult;
use crate::exec::job::Job;
use crate::store::ArtifactStore;

/// Receives the outputs of each successful job exactly once.
pub trait OutputCollector: Send + Sync {
    fn collect(&self, job: &Job, result: &ExecutionResult) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCollector;

impl OutputCollector for NullCollector {
    fn collect(&self, _job: &Job, _result: &ExecutionResult) -> Result<()> {
        Ok(())
    }
}

/// Copies output files into an artifact store and writes a metadata
/// document for each, hidden outputs included.
pub struct StoreCollector {
    store: Arc<dyn ArtifactStore>,
}

impl StoreCollector {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

impl OutputCollector for StoreCollector {
    fn collect(&self, job: &Job, result: &ExecutionResult) -> Result<()> {
        for (name, output) in &result.outputs {
            let artifact = ArtifactRef::new(output.artifact);
            if let Some(path) = &output.path {
                if !self.store.exists(&artifact) {
                    self.store.update_from_file(&artifact, path, true)?;
                }
            }
            let size = if self.store.exists(&artifact) {
                Some(self.store.size(&artifact)?)
            } else {
                None
            };

            let doc = json!({
                "id": output.artifact,
                "task_id": job.request.task_id,
                "job_id": job.id,
                "name": name,
                "visible": output.visible,
                "size": size,
                "created_at": job.finished_at,
            });
            self.store.put(output.artifact, &doc)?;
            debug!(job = job.id, output = %name, artifact = %output.artifact, "output stored");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::artifact::hash::bytes_uuid;
    use crate::dag::{ExecutionRequest, TaskKind};
    use crate::exec::executor::JobOutput;
    use crate::store::FileArtifactStore;

    #[test]
    fn store_collector_writes_data_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileArtifactStore::new(dir.path().join("store")).unwrap());
        let file = dir.path().join("out");
        std::fs::write(&file, "data").unwrap();
        let id = bytes_uuid(b"data");

        let job = Job::new(
            7,
            ExecutionRequest {
                task_id: "t".into(),
                kind: TaskKind::Shell { command: "true".into() },
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
            },
        );
        let mut result = ExecutionResult::default();
        result.outputs.insert(
            "out".into(),
            JobOutput {
                artifact: id,
                path: Some(file),
                visible: true,
            },
        );

        StoreCollector::new(store.clone()).collect(&job, &result).unwrap();

        assert!(store.exists(&ArtifactRef::new(id)));
        let doc = store.get(id).unwrap().unwrap();
        assert_eq!(doc["task_id"], "t");
        assert_eq!(doc["size"], 4);
    }
}
