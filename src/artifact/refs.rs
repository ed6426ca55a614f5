// src/artifact/refs.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::hash::file_uuid;
use crate::errors::{CompileError, Result};

/// Artifacts are identified by UUID.
pub type ArtifactId = Uuid;

/// A reference to a piece of data by id. Equality is by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: ArtifactId,
}

impl ArtifactRef {
    pub fn new(id: ArtifactId) -> Self {
        Self { id }
    }
}

/// An existing file, identified by the SHA-1 of its content.
///
/// Two files with the same bytes get the same id, so the artifact store
/// only keeps one copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArtifact {
    pub id: ArtifactId,
    pub path: PathBuf,
}

impl SourceArtifact {
    /// Hash the file at `path`. Fails with `SourceNotFound` if it does not
    /// exist.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CompileError::SourceNotFound(path.to_path_buf()).into());
        }
        let path = std::path::absolute(path)?;
        let id = file_uuid(&path)?;
        Ok(Self { id, path })
    }

    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::new(self.id)
    }
}

impl PartialEq for SourceArtifact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SourceArtifact {}

/// An output a task will produce, minted with a random id when the task
/// declares it.
///
/// `task_id` points back at the producing task. The id may be remapped
/// later when a job record supplies the historical artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub id: ArtifactId,
    pub task_id: String,
}

impl OutputSlot {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
        }
    }

    pub fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::new(self.id)
    }
}

/// Forward reference to an output of a task that has not run yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRef {
    pub task_id: String,
    pub id: ArtifactId,
}

impl PendingRef {
    pub fn new(task_id: impl Into<String>, id: ArtifactId) -> Result<Self> {
        let task_id = task_id.into();
        if !is_valid_task_id(&task_id) {
            return Err(CompileError::InvalidProducer(task_id).into());
        }
        Ok(Self { task_id, id })
    }

    /// Reference the given slot of its producing task.
    pub fn to_slot(slot: &OutputSlot) -> Result<Self> {
        Self::new(slot.task_id.clone(), slot.id)
    }
}

/// A task input: either data that already exists, or a forward reference.
///
/// `Artifact` is accepted by serde so that externally produced task lists
/// round-trip, but the compiler rejects it as a broken input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputRef {
    Artifact(ArtifactRef),
    Source(SourceArtifact),
    Pending(PendingRef),
}

impl InputRef {
    /// The artifact id this input currently resolves to.
    pub fn id(&self) -> ArtifactId {
        match self {
            InputRef::Artifact(a) => a.id,
            InputRef::Source(s) => s.id,
            InputRef::Pending(p) => p.id,
        }
    }

    /// Producing task id, for pending references.
    pub fn producer(&self) -> Option<&str> {
        match self {
            InputRef::Pending(p) => Some(p.task_id.as_str()),
            _ => None,
        }
    }
}

/// Task ids are non-empty and contain no whitespace or control characters.
pub fn is_valid_task_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_whitespace() || c.is_control())
}
