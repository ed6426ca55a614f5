// src/store/artifact.rs

//! Content store for artifact data and metadata documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::artifact::{directory_hash_id, ArtifactId, ArtifactRef};

/// Directory (below the store root) holding artifact data.
pub const OBJECT_DIR: &str = "objects";

/// What workers and the runtime need from an artifact store.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, artifact: &ArtifactRef) -> bool;
    /// Create an empty data file for `artifact`.
    fn create(&self, artifact: &ArtifactRef) -> Result<()>;
    fn get_filename(&self, artifact: &ArtifactRef) -> PathBuf;
    /// Copy `path` into the store. Unless `create` is set, the artifact
    /// must already exist.
    fn update_from_file(&self, artifact: &ArtifactRef, path: &Path, create: bool) -> Result<()>;
    /// Store a metadata document.
    fn put(&self, id: ArtifactId, doc: &Value) -> Result<()>;
    fn get(&self, id: ArtifactId) -> Result<Option<Value>>;
    /// Every metadata document accepted by `predicate`.
    fn filter(&self, predicate: &dyn Fn(&Value) -> bool) -> Result<Vec<Value>>;
    fn size(&self, artifact: &ArtifactRef) -> Result<u64>;
}

/// On-disk store: data lives at `<root>/objects/<bucket>/.../<id>` with its
/// metadata document next to it as `<id>.json`.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let dir = root.as_ref().join(OBJECT_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating artifact store at {:?}", dir))?;
        Ok(Self { dir })
    }

    fn bucket_dir(&self, id: ArtifactId) -> PathBuf {
        directory_hash_id(&id.to_string())
            .into_iter()
            .fold(self.dir.clone(), |p, part| p.join(part))
    }

    fn meta_path(&self, id: ArtifactId) -> PathBuf {
        self.bucket_dir(id).join(format!("{id}.json"))
    }

    fn ensure_bucket(&self, id: ArtifactId) -> Result<()> {
        let dir = self.bucket_dir(id);
        fs::create_dir_all(&dir).with_context(|| format!("creating bucket at {:?}", dir))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn exists(&self, artifact: &ArtifactRef) -> bool {
        self.get_filename(artifact).is_file()
    }

    fn create(&self, artifact: &ArtifactRef) -> Result<()> {
        self.ensure_bucket(artifact.id)?;
        let path = self.get_filename(artifact);
        fs::File::create(&path).with_context(|| format!("creating artifact at {:?}", path))?;
        Ok(())
    }

    fn get_filename(&self, artifact: &ArtifactRef) -> PathBuf {
        self.bucket_dir(artifact.id).join(artifact.id.to_string())
    }

    fn update_from_file(&self, artifact: &ArtifactRef, path: &Path, create: bool) -> Result<()> {
        if !create && !self.exists(artifact) {
            return Err(anyhow!("artifact {} does not exist in store", artifact.id));
        }
        self.ensure_bucket(artifact.id)?;
        let dest = self.get_filename(artifact);
        fs::copy(path, &dest)
            .with_context(|| format!("copying {:?} into store at {:?}", path, dest))?;
        info!(artifact = %artifact.id, source = ?path, "stored artifact data");
        Ok(())
    }

    fn put(&self, id: ArtifactId, doc: &Value) -> Result<()> {
        self.ensure_bucket(id)?;
        let path = self.meta_path(id);
        fs::write(&path, serde_json::to_string(doc)?)
            .with_context(|| format!("writing metadata at {:?}", path))?;
        debug!(artifact = %id, "stored artifact metadata");
        Ok(())
    }

    fn get(&self, id: ArtifactId) -> Result<Option<Value>> {
        let path = self.meta_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading metadata at {:?}", path))?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn filter(&self, predicate: &dyn Fn(&Value) -> bool) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut stack = vec![self.dir.clone()];

        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).with_context(|| format!("reading dir {:?}", dir))? {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|e| e == "json") {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading metadata at {:?}", path))?;
                    let doc: Value = serde_json::from_str(&text)?;
                    if predicate(&doc) {
                        out.push(doc);
                    }
                }
            }
        }

        Ok(out)
    }

    fn size(&self, artifact: &ArtifactRef) -> Result<u64> {
        let path = self.get_filename(artifact);
        let meta = fs::metadata(&path).with_context(|| format!("stat of artifact {:?}", path))?;
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn data_lands_in_uuid_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let id = Uuid::parse_str("3f2a9c10-0000-5000-8000-000000000001").unwrap();
        let artifact = ArtifactRef::new(id);

        assert_eq!(
            store.get_filename(&artifact),
            dir.path().join("objects/3f/2a").join(id.to_string())
        );
    }

    #[test]
    fn update_requires_create_for_new_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let src = dir.path().join("input.txt");
        fs::write(&src, b"hello").unwrap();
        let artifact = ArtifactRef::new(Uuid::new_v4());

        assert!(store.update_from_file(&artifact, &src, false).is_err());
        store.update_from_file(&artifact, &src, true).unwrap();
        assert!(store.exists(&artifact));
        assert_eq!(store.size(&artifact).unwrap(), 5);
        store.update_from_file(&artifact, &src, false).unwrap();
    }

    #[test]
    fn metadata_round_trips_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path()).unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.put(a, &json!({"uuid": a, "visible": true})).unwrap();
        store.put(b, &json!({"uuid": b, "visible": false})).unwrap();

        assert_eq!(store.get(a).unwrap().unwrap()["visible"], json!(true));
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());

        let visible = store.filter(&|d| d["visible"] == json!(true)).unwrap();
        assert_eq!(visible.len(), 1);
    }
}
