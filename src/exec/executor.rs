// src/exec/executor.rs

//! Executor abstraction plus the process-based implementation.
//!
//! The runtime talks to a [`TaskExecutor`] instead of spawning processes
//! itself, so tests can swap in a fake executor that never touches the OS.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifact::{file_uuid, ArtifactId, ArtifactRef};
use crate::dag::{ExecutionRequest, TaskKind};
use crate::errors::Result;
use crate::store::ArtifactStore;

/// One artifact produced by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub artifact: ArtifactId,
    /// Where the executor left the data, if it is a local file.
    pub path: Option<PathBuf>,
    /// Hidden outputs (logs and the like) are stored but never recorded as
    /// task outputs.
    pub visible: bool,
}

/// What an executor reports back for a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub outputs: BTreeMap<String, JobOutput>,
    pub error: Option<String>,
    /// Per-run directory the executor created, removed once the outputs
    /// have been collected. Failed runs keep theirs.
    pub scratch: Option<PathBuf>,
}

impl ExecutionResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Delete the scratch directory, if any.
    pub fn remove_scratch(&self) {
        let Some(dir) = &self.scratch else {
            return;
        };
        match std::fs::remove_dir_all(dir) {
            Ok(()) => debug!(scratch = ?dir, "removed scratch dir"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(scratch = ?dir, error = %e, "could not remove scratch dir"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Visible outputs only, by name.
    pub fn visible_outputs(&self) -> BTreeMap<String, ArtifactId> {
        self.outputs
            .iter()
            .filter(|(_, o)| o.visible)
            .map(|(name, o)| (name.clone(), o.artifact))
            .collect()
    }
}

/// Trait abstracting how a task's work is performed.
///
/// An `Err` means the executor itself could not operate. A task that ran and
/// failed is an `Ok` result carrying `error`.
pub trait TaskExecutor: Send + Sync {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult>> + Send + '_>>;
}

/// Runs shell and container tasks as local processes.
///
/// Each run gets a scratch directory. Inputs are passed as
/// `INPUT_<NAME>` paths into the artifact store; each declared output must be
/// written to the path in `OUTPUT_<NAME>`.
pub struct ProcessExecutor {
    store: Arc<dyn ArtifactStore>,
    work_root: PathBuf,
    container_runtime: String,
}

impl ProcessExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            work_root: work_root.into(),
            container_runtime: "docker".to_string(),
        }
    }

    pub fn with_container_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.container_runtime = runtime.into();
        self
    }

    async fn run(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionResult> {
        let scratch = self
            .work_root
            .join(format!("{}-{}", request.task_id, uuid::Uuid::new_v4()));

        let inputs: BTreeMap<String, PathBuf> = request
            .inputs
            .iter()
            .map(|(name, id)| (name.clone(), self.store.get_filename(&ArtifactRef::new(*id))))
            .collect();

        let mut cmd = match &request.kind {
            TaskKind::Shell { command } => {
                let mut c = shell_command(command);
                for (name, path) in &inputs {
                    c.env(env_name("INPUT", name), path);
                }
                for name in request.outputs.keys() {
                    c.env(env_name("OUTPUT", name), scratch.join(name));
                }
                c.current_dir(&scratch);
                c
            }
            TaskKind::Container { image, command } => {
                self.container_command(image, command, &scratch, &inputs, &request)
            }
            TaskKind::Workflow { engine, .. } => {
                return Ok(ExecutionResult::failed(format!(
                    "workflow engine '{engine}' is not available to the process executor"
                )));
            }
            TaskKind::Composite { .. } => {
                return Ok(ExecutionResult::failed("composite tasks do not execute"));
            }
        };

        tokio::fs::create_dir_all(&scratch)
            .await
            .with_context(|| format!("creating scratch dir {:?}", scratch))?;

        info!(task = %request.task_id, scratch = ?scratch, "starting task process");
        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning process for task '{}'", request.task_id))?;

        let mut result = ExecutionResult {
            scratch: Some(scratch.clone()),
            ..ExecutionResult::default()
        };
        for (name, bytes) in [("stdout", &output.stdout), ("stderr", &output.stderr)] {
            let path = scratch.join(format!("{name}.log"));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("writing {:?}", path))?;
            result.outputs.insert(
                name.to_string(),
                JobOutput {
                    artifact: file_uuid(&path)?,
                    path: Some(path),
                    visible: false,
                },
            );
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            task = %request.task_id,
            exit_code = code,
            success = output.status.success(),
            "task process exited"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            result.error = Some(format!("exit status {code}: {}", tail.join("\n")));
            return Ok(result);
        }

        for name in request.outputs.keys() {
            let path = scratch.join(name);
            if !path.is_file() {
                result.error = Some(format!("output '{name}' was not written"));
                return Ok(result);
            }
            let artifact = file_uuid(&path)?;
            debug!(task = %request.task_id, output = %name, %artifact, "collected output");
            result.outputs.insert(
                name.clone(),
                JobOutput {
                    artifact,
                    path: Some(path),
                    visible: true,
                },
            );
        }

        Ok(result)
    }

    fn container_command(
        &self,
        image: &str,
        command: &str,
        scratch: &Path,
        inputs: &BTreeMap<String, PathBuf>,
        request: &ExecutionRequest,
    ) -> Command {
        let mut c = Command::new(&self.container_runtime);
        c.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/work", scratch.display()))
            .arg("-w")
            .arg("/work");
        for (name, path) in inputs {
            let inside = format!("/inputs/{name}");
            c.arg("-v")
                .arg(format!("{}:{inside}:ro", path.display()))
                .arg("-e")
                .arg(format!("{}={inside}", env_name("INPUT", name)));
        }
        for name in request.outputs.keys() {
            c.arg("-e")
                .arg(format!("{}=/work/{name}", env_name("OUTPUT", name)));
        }
        c.arg(image).arg("sh").arg("-c").arg(command);
        c
    }
}

impl TaskExecutor for ProcessExecutor {
    fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionResult>> + Send + '_>> {
        Box::pin(async move {
            let task_id = request.task_id.clone();
            match self.run(request).await {
                Ok(result) => Ok(result),
                Err(err) => {
                    // Could not start or observe the process: report it as
                    // a task failure so siblings keep going.
                    warn!(task = %task_id, error = %err, "task execution error");
                    Ok(ExecutionResult::failed(format!("{err:#}")))
                }
            }
        })
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

/// `INPUT` + `raw-data` -> `INPUT_RAW_DATA`.
fn env_name(prefix: &str, name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}_{suffix}")
}
