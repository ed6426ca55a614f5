// src/errors.rs

//! Crate-wide error types.
//!
//! `CompileError` covers everything that can go wrong while turning the
//! declared task list into Dags; it aborts before any scheduling happens.
//! `FlowError` is the error type returned by the rest of the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskState;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("broken input '{input}' on task '{task}': not a source artifact or pending reference")]
    BrokenInput { task: String, input: String },

    #[error("task '{task}' input '{input}' references unknown output of '{producer}'")]
    UnresolvedReference {
        task: String,
        input: String,
        producer: String,
    },

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("file not found: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("invalid producing task id: {0:?}")]
    InvalidProducer(String),

    #[error("cycle detected in task graph involving task '{0}'")]
    Cycle(String),

    #[error("invalid task '{task}': {reason}")]
    InvalidTask { task: String, reason: String },
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Task '{task}' failed: {message}")]
    TaskFailure { task: String, message: String },

    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),

    #[error("Invalid state transition for task '{task}': {from:?} -> {to:?}")]
    InvalidTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Service fault: {0}")]
    ServiceFault(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
