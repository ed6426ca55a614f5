// src/config/build.rs

//! Turn validated task declarations into [`Task`]s ready for the compiler.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::artifact::{InputRef, SourceArtifact};
use crate::config::model::{ConfigFile, InputDecl, TaskDecl, TaskKindDecl};
use crate::dag::{Task, TaskId, TaskKind};
use crate::errors::{CompileError, FlowError, Result};

/// Build every declared task.
///
/// Source files are resolved against `base_dir` and hashed now, so a missing
/// file fails here with `SourceNotFound`. Outputs get fresh slots first;
/// task references then become pending references to those slots.
pub fn build_tasks(cfg: &ConfigFile, base_dir: &Path) -> Result<BTreeMap<TaskId, Task>> {
    let mut tasks: BTreeMap<TaskId, Task> = BTreeMap::new();

    for (id, decl) in cfg.task.iter() {
        let mut task = Task::new(id.clone(), task_kind(id, decl, base_dir)?);
        task.priority = decl.priority;
        for output in &decl.outputs {
            task.declare_output(output.clone());
        }
        tasks.insert(id.clone(), task);
    }

    for (id, decl) in cfg.task.iter() {
        let mut inputs = Vec::with_capacity(decl.inputs.len());
        for (name, input) in decl.inputs.iter() {
            let input_ref = match input {
                InputDecl::File { file } => {
                    InputRef::Source(SourceArtifact::from_path(base_dir.join(file))?)
                }
                InputDecl::Task { task, output } => {
                    let producer = tasks.get(task).ok_or_else(|| {
                        FlowError::from(CompileError::UnresolvedReference {
                            task: id.clone(),
                            input: name.clone(),
                            producer: task.clone(),
                        })
                    })?;
                    InputRef::Pending(producer.output_ref(output)?)
                }
            };
            inputs.push((name.clone(), input_ref));
        }

        if let Some(task) = tasks.get_mut(id) {
            for (name, input_ref) in inputs {
                task.add_input(name, input_ref);
            }
        }
    }

    debug!(tasks = tasks.len(), "built tasks from config");
    Ok(tasks)
}

fn task_kind(id: &str, decl: &TaskDecl, base_dir: &Path) -> Result<TaskKind> {
    let required = |field: &Option<String>, name: &str| {
        field.clone().ok_or_else(|| {
            FlowError::from(CompileError::InvalidTask {
                task: id.to_string(),
                reason: format!("missing `{name}`"),
            })
        })
    };

    Ok(match decl.kind {
        TaskKindDecl::Shell => TaskKind::Shell {
            command: required(&decl.cmd, "cmd")?,
        },
        TaskKindDecl::Container => TaskKind::Container {
            image: required(&decl.image, "image")?,
            command: required(&decl.cmd, "cmd")?,
        },
        TaskKindDecl::Workflow => TaskKind::Workflow {
            engine: required(&decl.engine, "engine")?,
            workflow: required(&decl.workflow, "workflow")?,
        },
        TaskKindDecl::Composite => TaskKind::Composite {
            path: base_dir.join(decl.path.clone().unwrap_or_default()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompileError;

    #[test]
    fn references_become_pending_refs_to_producer_slots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("genome.fa"), ">chr1\nACGT\n").unwrap();
        let cfg: ConfigFile = toml::from_str(
            r#"
            [task.index]
            cmd = "index"
            outputs = ["idx"]
            [task.index.inputs]
            genome = { file = "genome.fa" }

            [task.align]
            cmd = "align"
            [task.align.inputs]
            idx = { task = "index", output = "idx" }
            "#,
        )
        .unwrap();

        let tasks = build_tasks(&cfg, dir.path()).unwrap();
        let slot = tasks["index"].outputs["idx"].id;
        match &tasks["align"].inputs["idx"] {
            InputRef::Pending(p) => {
                assert_eq!(p.task_id, "index");
                assert_eq!(p.id, slot);
            }
            other => panic!("expected pending ref, got {other:?}"),
        }
        assert!(matches!(tasks["index"].inputs["genome"], InputRef::Source(_)));
    }

    #[test]
    fn missing_source_file_is_a_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: ConfigFile = toml::from_str(
            r#"
            [task.a]
            cmd = "cat $INPUT_X"
            [task.a.inputs]
            x = { file = "absent.txt" }
            "#,
        )
        .unwrap();

        let err = build_tasks(&cfg, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Compile(CompileError::SourceNotFound(_))
        ));
    }
}
