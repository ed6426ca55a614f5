// src/store/jobrecord.rs

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::hash::name_digest;
use crate::artifact::{ArtifactId, ArtifactRef};

/// Directory (below the store root) holding one JSON file per task.
pub const JOB_DIR: &str = "jobs";

/// Inputs a task ran with and the outputs it produced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub inputs: BTreeMap<String, ArtifactRef>,
    #[serde(default)]
    pub outputs: BTreeMap<String, ArtifactRef>,
}

impl JobRecord {
    pub fn new(
        inputs: BTreeMap<String, ArtifactId>,
        outputs: BTreeMap<String, ArtifactId>,
    ) -> Self {
        let wrap = |m: BTreeMap<String, ArtifactId>| {
            m.into_iter()
                .map(|(k, id)| (k, ArtifactRef::new(id)))
                .collect()
        };
        Self {
            inputs: wrap(inputs),
            outputs: wrap(outputs),
        }
    }

    /// Exact match: same input names, same artifact id for each.
    pub fn matches_inputs(&self, current: &BTreeMap<String, ArtifactId>) -> bool {
        self.inputs.len() == current.len()
            && self
                .inputs
                .iter()
                .all(|(name, stored)| current.get(name) == Some(&stored.id))
    }

    /// Whether the record supplies an id for every one of `names`.
    pub fn covers_outputs<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        names.into_iter().all(|name| self.outputs.contains_key(name))
    }

    pub fn output_ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        self.outputs.values().map(|r| r.id)
    }
}

/// Abstract storage for job records, keyed by task id.
///
/// Records are written whole; a later save for the same task replaces the
/// earlier one.
pub trait JobRecordStore: Send + Sync {
    fn load(&self, task_id: &str) -> Result<Option<JobRecord>>;
    fn save(&mut self, task_id: &str, record: &JobRecord) -> Result<()>;
}

/// Stores records as `<root>/jobs/<stem>.<sha1 of task id>.json`.
#[derive(Debug, Clone)]
pub struct FileJobRecordStore {
    dir: PathBuf,
}

impl FileJobRecordStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(JOB_DIR),
        }
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}.json", file_stem(task_id), name_digest(task_id)))
    }
}

impl JobRecordStore for FileJobRecordStore {
    fn load(&self, task_id: &str) -> Result<Option<JobRecord>> {
        let path = self.record_path(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading job record at {:?}", path))?;
        let record = serde_json::from_str(&text)
            .with_context(|| format!("parsing job record at {:?}", path))?;
        debug!(task = %task_id, "loaded job record (file)");
        Ok(Some(record))
    }

    fn save(&mut self, task_id: &str, record: &JobRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating job record directory at {:?}", self.dir))?;

        let path = self.record_path(task_id);
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, text).with_context(|| format!("writing job record at {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("moving job record into place at {:?}", path))?;

        info!(task = %task_id, outputs = record.outputs.len(), "stored job record (file)");
        Ok(())
    }
}

/// Keeps records in memory only. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobRecordStore {
    records: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl MemoryJobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobRecordStore for MemoryJobRecordStore {
    fn load(&self, task_id: &str) -> Result<Option<JobRecord>> {
        let map = self
            .records
            .lock()
            .map_err(|_| anyhow!("job record map lock poisoned"))?;
        Ok(map.get(task_id).cloned())
    }

    fn save(&mut self, task_id: &str, record: &JobRecord) -> Result<()> {
        let mut map = self
            .records
            .lock()
            .map_err(|_| anyhow!("job record map lock poisoned"))?;
        map.insert(task_id.to_string(), record.clone());
        info!(task = %task_id, outputs = record.outputs.len(), "stored job record (memory)");
        Ok(())
    }
}

/// Readable part of a record file name. Lossy; the digest suffix keeps
/// distinct task ids apart.
fn file_stem(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids(pairs: &[(&str, ArtifactId)]) -> BTreeMap<String, ArtifactId> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn matching_requires_identical_inputs() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let record = JobRecord::new(ids(&[("x", a), ("y", b)]), BTreeMap::new());

        assert!(record.matches_inputs(&ids(&[("x", a), ("y", b)])));
        assert!(!record.matches_inputs(&ids(&[("x", a), ("y", a)])));
        assert!(!record.matches_inputs(&ids(&[("x", a)])));
        assert!(!record.matches_inputs(&ids(&[("x", a), ("y", b), ("z", b)])));
    }

    #[test]
    fn file_store_overwrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileJobRecordStore::new(dir.path());
        assert!(store.load("align").unwrap().is_none());

        let first = JobRecord::new(ids(&[("x", Uuid::new_v4())]), ids(&[("bam", Uuid::new_v4())]));
        store.save("align", &first).unwrap();
        let second = JobRecord::new(BTreeMap::new(), ids(&[("bai", Uuid::new_v4())]));
        store.save("align", &second).unwrap();

        assert_eq!(store.load("align").unwrap(), Some(second));
    }

    #[test]
    fn file_names_are_flattened() {
        assert_eq!(file_stem("sub:/graph/a"), "sub__graph_a");
        let store = FileJobRecordStore::new("/store");
        let name = store.record_path("sub:/graph/a");
        let name = name.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sub__graph_a."), "{name}");
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn ids_that_flatten_alike_keep_separate_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileJobRecordStore::new(dir.path());
        let slashed = JobRecord::new(BTreeMap::new(), ids(&[("out", Uuid::new_v4())]));
        store.save("a/b", &slashed).unwrap();

        assert!(store.load("a_b").unwrap().is_none());
        assert!(store.load("a:b").unwrap().is_none());
        assert_eq!(store.load("a/b").unwrap(), Some(slashed));
    }
}
