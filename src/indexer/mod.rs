//! Indexer service
//!
//! Applies document mutations to a local tantivy index and publishes
//! immutable segment snapshots to the segment store. All operations are
//! serialized behind one exclusive lock; commit+upload additionally takes a
//! filesystem lock so two processes cannot publish from the same index
//! directory at once.

pub mod mapping;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value as Json;
use tantivy::{Index, IndexWriter, Term};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::ComputedField;
use crate::error::{Result, ShoalError};
use crate::planning::evaluate_computed_field;
use crate::storage::{self, SegmentStore};

pub use mapping::{FieldMapping, IndexMapping, MappedFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Inner {
    // None once the indexer is closed
    writer: Option<IndexWriter>,
    fields: MappedFields,
}

/// The indexer: upserts, deletes and batch writes against a local index,
/// and a commit protocol that snapshots the index directory into the
/// segment store under a fresh timestamped prefix.
pub struct Indexer {
    index_dir: PathBuf,
    base_name: String,
    store: std::sync::Arc<dyn SegmentStore>,
    computed_fields: Vec<ComputedField>,
    inner: Mutex<Inner>,
}

impl Indexer {
    /// Open or create the local index under `index_dir`
    pub fn open(
        index_dir: impl Into<PathBuf>,
        mapping: IndexMapping,
        computed_fields: Vec<ComputedField>,
        store: std::sync::Arc<dyn SegmentStore>,
    ) -> Result<Self> {
        let index_dir = index_dir.into();
        std::fs::create_dir_all(&index_dir)?;

        let (schema, fields) = mapping.build_schema();
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(&index_dir)?
        } else {
            info!(path = %index_dir.display(), "creating new index");
            Index::create_in_dir(&index_dir, schema)?
        };
        let writer = index.writer(WRITER_HEAP_BYTES)?;

        let base_name = index_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());

        Ok(Self {
            index_dir,
            base_name,
            store,
            computed_fields,
            inner: Mutex::new(Inner {
                writer: Some(writer),
                fields,
            }),
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Upsert one document by id
    pub async fn index(&self, id: &str, data: &serde_json::Map<String, Json>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let attrs = self.materialize(data)?;
        Self::upsert(&mut inner, id, &attrs)
    }

    /// Delete by id; deleting an id that was never indexed succeeds
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let id_field = inner.fields.id;
        let writer = Self::writer(&mut inner)?;
        writer.delete_term(Term::from_field_text(id_field, id));
        Ok(())
    }

    /// Batch upsert; atomic from the writer's viewpoint because the lock is
    /// held across the whole batch
    pub async fn bulk_index(&self, docs: &BTreeMap<String, serde_json::Map<String, Json>>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for (id, data) in docs {
            let attrs = self.materialize(data)?;
            Self::upsert(&mut inner, id, &attrs)?;
        }
        Ok(())
    }

    /// Flush pending mutations, snapshot the index directory, and upload it
    /// as `{base}_{UTC timestamp}/`. Returns the published segment name.
    ///
    /// Fails with `IndexLocked` without touching the store when another
    /// commit holds the filesystem lock.
    pub async fn commit_and_upload(&self) -> Result<String> {
        // Filesystem lock first: a commit racing an in-flight commit fails
        // fast with IndexLocked instead of queueing behind the mutex.
        let _lock = CommitLock::acquire(&self.index_dir)?;
        let mut inner = self.inner.lock().await;

        Self::writer(&mut inner)?.commit()?;

        let segment = storage::segment_name(&self.base_name, Utc::now());
        info!(segment = %segment, "uploading committed segment");
        storage::upload_segment(self.store.as_ref(), &self.index_dir, &segment).await?;
        info!(segment = %segment, "segment upload complete");
        Ok(segment)
    }

    /// Release the local index; subsequent operations fail
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(mut writer) = inner.writer.take() {
            writer.commit()?;
            writer.wait_merging_threads()?;
        }
        Ok(())
    }

    fn writer(inner: &mut Inner) -> Result<&mut IndexWriter> {
        inner
            .writer
            .as_mut()
            .ok_or_else(|| ShoalError::Engine("index is closed".to_string()))
    }

    fn upsert(inner: &mut Inner, id: &str, attrs: &serde_json::Map<String, Json>) -> Result<()> {
        let doc = inner.fields.to_document(id, attrs)?;
        let id_field = inner.fields.id;
        let writer = Self::writer(inner)?;
        writer.delete_term(Term::from_field_text(id_field, id));
        writer.add_document(doc)?;
        Ok(())
    }

    /// Evaluate the configured computed fields against the raw attributes
    /// and inject the derived values before the document reaches the engine
    fn materialize(&self, data: &serde_json::Map<String, Json>) -> Result<serde_json::Map<String, Json>> {
        let mut attrs = data.clone();
        for field in &self.computed_fields {
            let value = evaluate_computed_field(field, data)?;
            attrs.insert(field.name.clone(), value);
        }
        Ok(attrs)
    }
}

/// Exclusive-create lock file held for the duration of one commit+upload.
/// Released on every exit path, including panics, via `Drop`.
struct CommitLock {
    path: PathBuf,
}

impl CommitLock {
    fn acquire(index_dir: &Path) -> Result<Self> {
        let file_name = index_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        let parent = index_dir.parent().unwrap_or(index_dir);
        let path = parent.join(format!("{file_name}.commit.lock"));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ShoalError::IndexLocked {
                    lock_path: path.display().to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for CommitLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            // The upload already happened; a stale lock only blocks future
            // commits, so flag it loudly instead of failing the operation.
            error!(lock = %self.path.display(), error = %e, "failed to remove commit lock file");
        }
    }
}
