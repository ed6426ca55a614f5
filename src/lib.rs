// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{build_tasks, default_config_path, load_and_validate, validate_config, ConfigFile};
use crate::dag::{DagSet, GraphCompiler, TaskKind};
use crate::engine::{import_sources, RunReport, Runtime};
use crate::errors::FlowError;
use crate::exec::{ProcessExecutor, StoreCollector};
use crate::scheduler::{Scheduler, SharedScheduler};
use crate::store::{ArtifactStore, FileArtifactStore, FileJobRecordStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - task building and graph compilation
/// - artifact and job-record stores
/// - scheduler, executor and runtime
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut cfg = load_and_validate(&config_path)?;
    apply_overrides(&mut cfg, &args)?;

    let base_dir = config_root_dir(&config_path);
    let dags = compile_config(&cfg, &base_dir)?;

    if args.dry_run {
        print_dry_run(&cfg, &dags);
        return Ok(());
    }

    let store_root = base_dir.join(&cfg.store.root);
    let store: Arc<dyn ArtifactStore> = Arc::new(FileArtifactStore::new(&store_root)?);
    import_sources(&dags, store.as_ref())?;

    let scheduler = SharedScheduler::new(Scheduler::new(
        dags,
        Box::new(FileJobRecordStore::new(&store_root)),
        cfg.config.scheduler_options(),
    ));
    let executor = Arc::new(
        ProcessExecutor::new(store.clone(), store_root.join("work"))
            .with_container_runtime(&cfg.config.container_runtime),
    );
    let collector = Arc::new(StoreCollector::new(store.clone()));

    let report = Runtime::new(scheduler, executor, collector, cfg.config.runtime_options())
        .with_store(store)
        .run()
        .await?;

    print_report(&report);
    check_report(&report)
}

/// Build and compile the tasks declared in `cfg`.
pub fn compile_config(cfg: &ConfigFile, base_dir: &Path) -> Result<DagSet, FlowError> {
    let tasks = build_tasks(cfg, base_dir)?;
    let dags = GraphCompiler::from_tasks(tasks.into_values())?.compile()?;
    info!(dags = dags.len(), tasks = dags.task_count(), "compiled task graph");
    Ok(dags)
}

fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if !args.hosts.is_empty() {
        cfg.config.hosts = args.hosts.clone();
    }
    if let Some(max_dags) = args.max_dags {
        cfg.config.max_dags = max_dags;
    }
    validate_config(cfg)?;
    Ok(())
}

/// Directory relative paths in the config are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "pipelines/Flowgraph.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Flowgraph.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Turn an unsuccessful run into an error carrying the first failure.
fn check_report(report: &RunReport) -> Result<()> {
    if let Some((task, message)) = report.failed.first() {
        return Err(FlowError::TaskFailure {
            task: task.clone(),
            message: message.clone(),
        }
        .into());
    }
    if report.interrupted {
        return Err(anyhow!("run interrupted"));
    }
    if report.stalled || !report.stranded.is_empty() {
        return Err(anyhow!(
            "run stalled; no host holds the inputs of: {}",
            report.stranded.join(", ")
        ));
    }
    if !report.is_success() {
        return Err(anyhow!("run finished with {} unfinished tasks", report.summary.pending));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let s = &report.summary;
    eprintln!(
        "flowgraph: {} done, {} failed, {} blocked, {} pending",
        s.done, s.failed, s.blocked, s.pending
    );
    for (task, message) in &report.failed {
        eprintln!("  failed  {task}: {message}");
    }
    for task in &report.blocked {
        eprintln!("  blocked {task}");
    }
}

/// Simple dry-run output: print every Dag with its tasks and edges.
fn print_dry_run(cfg: &ConfigFile, dags: &DagSet) {
    println!("flowgraph dry-run");
    println!("  config.max_dags = {}", cfg.config.max_dags);
    println!("  config.locality = {:?}", cfg.config.locality);
    println!("  config.hosts = {:?}", cfg.config.hosts);
    println!();

    println!("dags ({}):", dags.len());
    for dag in dags.iter() {
        println!("  dag {} ({} tasks)", dag.dag_id, dag.tasks.len());
        for task in dag.tasks.values() {
            let kind = match &task.kind {
                TaskKind::Shell { command } => format!("shell: {command}"),
                TaskKind::Container { image, command } => format!("container {image}: {command}"),
                TaskKind::Workflow { engine, workflow } => format!("workflow {engine}: {workflow}"),
                TaskKind::Composite { path } => format!("composite: {}", path.display()),
            };
            println!("    - {}", task.task_id);
            println!("        {kind}");
            let deps = task.dependencies();
            if !deps.is_empty() {
                println!("        after: {:?}", deps);
            }
            if !task.outputs.is_empty() {
                println!("        outputs: {:?}", task.outputs.keys().collect::<Vec<_>>());
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
