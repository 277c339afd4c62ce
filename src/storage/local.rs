use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, ShoalError};
use crate::storage::SegmentStore;

/// Filesystem stand-in for a blob store. Objects are plain files under a
/// configured root, keyed by their forward-slash object keys.
pub struct LocalSegmentStore {
    root: PathBuf,
}

impl LocalSegmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ShoalError::Config(format!(
                "failed to create storage directory {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let rel: PathBuf = key.split('/').collect();
        self.root.join(rel)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SegmentStore for LocalSegmentStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let data = tokio::fs::read(self.object_path(key)).await?;
        Ok(Bytes::from(data))
    }

    async fn list_segments(&self, base: &str) -> Result<Vec<String>> {
        let prefix = format!("{base}_");
        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) {
                segments.push(name);
            }
        }
        Ok(segments)
    }

    async fn list_objects(&self, segment: &str) -> Result<Vec<String>> {
        let segment_dir = self.root.join(segment);
        if !segment_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in walkdir::WalkDir::new(&segment_dir) {
            let entry = entry.map_err(|e| ShoalError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&segment_dir)
                .expect("walked path is under its root");
            keys.push(
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
        Ok(keys)
    }
}
