#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flowgraph::artifact::{InputRef, SourceArtifact};
use flowgraph::config::{validate_config, ConfigFile, ConfigSection, InputDecl, StoreSection, TaskDecl, TaskKindDecl};
use flowgraph::dag::{Task, TaskKind};
use flowgraph::types::LocalityPolicy;

/// Builder for `Task` to simplify graph setup.
///
/// ```ignore
/// let a = TaskBuilder::shell("a").output("x").build();
/// let b = TaskBuilder::shell("b").input_from("in", &a, "x").build();
/// ```
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn shell(id: &str) -> Self {
        Self {
            task: Task::new(
                id,
                TaskKind::Shell {
                    command: format!("echo {id}"),
                },
            ),
        }
    }

    pub fn composite(id: &str) -> Self {
        Self {
            task: Task::new(
                id,
                TaskKind::Composite {
                    path: PathBuf::from(format!("{id}.toml")),
                },
            ),
        }
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.task.declare_output(name);
        self
    }

    /// Consume output `output` of `producer` as input `name`.
    pub fn input_from(mut self, name: &str, producer: &Task, output: &str) -> Self {
        let pending = producer
            .output_ref(output)
            .expect("producer must declare the output");
        self.task.add_input(name, InputRef::Pending(pending));
        self
    }

    /// Consume the file at `path` as input `name`. The file must exist.
    pub fn source(mut self, name: &str, path: &Path) -> Self {
        let src = SourceArtifact::from_path(path).expect("source file must exist");
        self.task.add_input(name, InputRef::Source(src));
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for `ConfigFile`.
pub struct ConfigFileBuilder {
    config: ConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigFile {
                config: ConfigSection::default(),
                store: StoreSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, id: &str, task: TaskDecl) -> Self {
        self.config.task.insert(id.to_string(), task);
        self
    }

    pub fn with_hosts(mut self, hosts: &[&str]) -> Self {
        self.config.config.hosts = hosts.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn with_max_dags(mut self, max_dags: usize) -> Self {
        self.config.config.max_dags = max_dags;
        self
    }

    pub fn with_locality(mut self, locality: LocalityPolicy) -> Self {
        self.config.config.locality = locality;
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> ConfigFile {
        validate_config(&self.config).expect("Failed to build valid config from builder");
        self.config
    }

    /// Return the config without validating it.
    pub fn build_unchecked(self) -> ConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskDecl`.
pub struct TaskDeclBuilder {
    task: TaskDecl,
}

impl TaskDeclBuilder {
    pub fn shell(cmd: &str) -> Self {
        Self {
            task: TaskDecl {
                kind: TaskKindDecl::Shell,
                cmd: Some(cmd.to_string()),
                ..TaskDecl::default()
            },
        }
    }

    pub fn composite(path: &str) -> Self {
        Self {
            task: TaskDecl {
                kind: TaskKindDecl::Composite,
                path: Some(PathBuf::from(path)),
                ..TaskDecl::default()
            },
        }
    }

    pub fn output(mut self, name: &str) -> Self {
        self.task.outputs.push(name.to_string());
        self
    }

    pub fn file(mut self, name: &str, path: &str) -> Self {
        self.task.inputs.insert(
            name.to_string(),
            InputDecl::File {
                file: PathBuf::from(path),
            },
        );
        self
    }

    pub fn from_task(mut self, name: &str, task: &str, output: &str) -> Self {
        self.task.inputs.insert(
            name.to_string(),
            InputDecl::Task {
                task: task.to_string(),
                output: output.to_string(),
            },
        );
        self
    }

    pub fn build(self) -> TaskDecl {
        self.task
    }
}
