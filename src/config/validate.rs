// src/config/validate.rs

use crate::artifact::refs::is_valid_task_id;
use crate::config::model::{ConfigFile, InputDecl, TaskDecl, TaskKindDecl};
use crate::errors::{FlowError, Result};

/// Semantic checks that serde cannot express.
///
/// Cycles are left to the graph compiler, which sees the final edges.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    for (id, task) in cfg.task.iter() {
        validate_task_fields(id, task)?;
    }
    validate_task_references(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &ConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(FlowError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &ConfigFile) -> Result<()> {
    // locality is strongly typed and checked during deserialization.

    if cfg.config.hosts.is_empty() {
        return Err(FlowError::ConfigError(
            "[config].hosts must name at least one host".to_string(),
        ));
    }
    if let Some(host) = cfg.config.hosts.iter().find(|h| h.trim().is_empty()) {
        return Err(FlowError::ConfigError(format!(
            "[config].hosts contains an empty host name ({host:?})"
        )));
    }
    if cfg.config.wait_ceiling == 0 {
        return Err(FlowError::ConfigError(
            "[config].wait_ceiling must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.wait_unit_ms == 0 {
        return Err(FlowError::ConfigError(
            "[config].wait_unit_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_fields(id: &str, task: &TaskDecl) -> Result<()> {
    if !is_valid_task_id(id) {
        return Err(FlowError::ConfigError(format!("invalid task id {id:?}")));
    }

    let missing = |field: &str| {
        FlowError::ConfigError(format!(
            "task '{id}' of kind {:?} requires `{field}`",
            task.kind
        ))
    };
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    match task.kind {
        TaskKindDecl::Shell if !present(&task.cmd) => return Err(missing("cmd")),
        TaskKindDecl::Container if !present(&task.image) => return Err(missing("image")),
        TaskKindDecl::Container if !present(&task.cmd) => return Err(missing("cmd")),
        TaskKindDecl::Workflow if !present(&task.engine) => return Err(missing("engine")),
        TaskKindDecl::Workflow if !present(&task.workflow) => return Err(missing("workflow")),
        TaskKindDecl::Composite if task.path.is_none() => return Err(missing("path")),
        _ => {}
    }

    let mut seen = std::collections::BTreeSet::new();
    for output in &task.outputs {
        if output.trim().is_empty() {
            return Err(FlowError::ConfigError(format!(
                "task '{id}' declares an empty output name"
            )));
        }
        if !seen.insert(output.as_str()) {
            return Err(FlowError::ConfigError(format!(
                "task '{id}' declares output '{output}' twice"
            )));
        }
    }
    Ok(())
}

fn validate_task_references(cfg: &ConfigFile) -> Result<()> {
    for (id, task) in cfg.task.iter() {
        for (input, decl) in task.inputs.iter() {
            let InputDecl::Task {
                task: producer,
                output,
            } = decl
            else {
                continue;
            };

            if producer == id {
                return Err(FlowError::ConfigError(format!(
                    "task '{id}' input '{input}' cannot reference its own output"
                )));
            }
            let Some(upstream) = cfg.task.get(producer) else {
                return Err(FlowError::ConfigError(format!(
                    "task '{id}' input '{input}' references unknown task '{producer}'"
                )));
            };
            if !upstream.outputs.iter().any(|o| o == output) {
                return Err(FlowError::ConfigError(format!(
                    "task '{id}' input '{input}' references unknown output '{output}' of task '{producer}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ConfigFile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = parse(
            r#"
            [task.a]
            cmd = "echo a"
            "#,
        );
        validate_config(&cfg).unwrap();
        assert_eq!(cfg.config.hosts, vec!["local-0".to_string()]);
        assert_eq!(cfg.config.wait_ceiling, 60);
    }

    #[test]
    fn unknown_output_reference_is_rejected() {
        let cfg = parse(
            r#"
            [task.a]
            cmd = "echo a"
            outputs = ["x"]

            [task.b]
            cmd = "echo b"
            [task.b.inputs]
            in = { task = "a", output = "nope" }
            "#,
        );
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("unknown output 'nope'"), "{err}");
    }

    #[test]
    fn kind_specific_fields_are_required() {
        let cfg = parse(
            r#"
            [task.c]
            kind = "container"
            cmd = "ls"
            "#,
        );
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("requires `image`"), "{err}");
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let cfg = parse(
            r#"
            [config]
            wait_ceiling = 0

            [task.a]
            cmd = "echo a"
            "#,
        );
        assert!(validate_config(&cfg).is_err());
    }
}
