// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::RuntimeOptions;
use crate::exec::WaitOptions;
use crate::scheduler::SchedulerOptions;
use crate::types::LocalityPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// max_dags = 0
/// locality = "strict"
/// hosts = ["local-0"]
/// container_runtime = "docker"
///
/// [store]
/// root = ".flowgraph"
///
/// [task.index]
/// cmd = "bwa index $INPUT_GENOME && cp genome.fa.bwt $OUTPUT_IDX"
/// outputs = ["idx"]
/// [task.index.inputs]
/// genome = { file = "data/genome.fa" }
///
/// [task.align]
/// cmd = "bwa mem $INPUT_IDX reads.fq > $OUTPUT_BAM"
/// outputs = ["bam"]
/// [task.align.inputs]
/// idx = { task = "index", output = "idx" }
/// ```
///
/// All sections except `task` are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub store: StoreSection,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskDecl>,
}

/// `[config]` section: scheduling and runtime knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// New Dags a single activation scan may admit; 0 means no cap.
    #[serde(default)]
    pub max_dags: usize,

    #[serde(default)]
    pub locality: LocalityPolicy,

    /// Worker hosts for the local runtime.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Backoff unit for `wait`.
    #[serde(default = "default_wait_unit_ms")]
    pub wait_unit_ms: u64,

    /// Backoff ceiling, in units.
    #[serde(default = "default_wait_ceiling")]
    pub wait_ceiling: u32,

    /// Abort the run when nothing has started or finished for this long.
    #[serde(default)]
    pub stall_timeout_secs: Option<u64>,

    /// Program used to run `container` tasks.
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
}

fn default_hosts() -> Vec<String> {
    vec!["local-0".to_string()]
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_wait_unit_ms() -> u64 {
    1000
}

fn default_wait_ceiling() -> u32 {
    60
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_dags: 0,
            locality: LocalityPolicy::default(),
            hosts: default_hosts(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_unit_ms: default_wait_unit_ms(),
            wait_ceiling: default_wait_ceiling(),
            stall_timeout_secs: None,
            container_runtime: default_container_runtime(),
        }
    }
}

impl ConfigSection {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_dags: self.max_dags,
            locality: self.locality,
        }
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            hosts: self.hosts.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            wait: WaitOptions {
                unit: Duration::from_millis(self.wait_unit_ms),
                ceiling: self.wait_ceiling,
            },
            stall_timeout: self.stall_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Relative paths are resolved against the config file's directory.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from(".flowgraph")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKindDecl {
    #[default]
    Shell,
    Container,
    Workflow,
    Composite,
}

/// `[task.<id>]` section.
///
/// Which fields are required depends on `kind`:
/// - `shell`: `cmd`
/// - `container`: `image` and `cmd`
/// - `workflow`: `engine` and `workflow`
/// - `composite`: `path`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDecl {
    #[serde(default)]
    pub kind: TaskKindDecl,

    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub engine: Option<String>,

    #[serde(default)]
    pub workflow: Option<String>,

    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Names of the outputs this task produces.
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub priority: f64,

    #[serde(default)]
    pub inputs: BTreeMap<String, InputDecl>,
}

/// One entry of `[task.<id>.inputs]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputDecl {
    /// `{ file = "data/x.txt" }`: a source file, relative to the config dir.
    File { file: PathBuf },
    /// `{ task = "a", output = "x" }`: output `x` of task `a`.
    Task { task: String, output: String },
}
