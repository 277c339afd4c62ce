//! Segment storage
//!
//! Segments are immutable directories of index files published under a
//! `{base}_{YYYYMMDDTHHMMSSZ}/` prefix. The store is append-only from this
//! crate's point of view; retention is the operator's concern.

pub mod blob;
pub mod local;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, ShoalError};

pub use blob::BlobSegmentStore;
pub use local::LocalSegmentStore;

/// Segment names carry a second-resolution UTC timestamp
pub const SEGMENT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const MAX_UPLOAD_ATTEMPTS: usize = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Compose a segment name from its base name and a commit instant
pub fn segment_name(base: &str, at: DateTime<Utc>) -> String {
    format!("{base}_{}", at.format(SEGMENT_TIMESTAMP_FORMAT))
}

/// Durable object storage for published index segments.
///
/// Keys use forward slashes on every platform. Implementations only need
/// flat object operations; directory semantics live in the helpers below.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Names of all segments published under `{base}_`
    async fn list_segments(&self, base: &str) -> Result<Vec<String>>;

    /// Keys within one segment, relative to the segment prefix
    async fn list_objects(&self, segment: &str) -> Result<Vec<String>>;
}

/// Upload every regular file under `local_dir` as
/// `{segment}/{relative_path}`, retrying each object on failure.
pub async fn upload_segment(
    store: &dyn SegmentStore,
    local_dir: &Path,
    segment: &str,
) -> Result<()> {
    let meta = std::fs::metadata(local_dir)
        .map_err(|_| ShoalError::PathMissing(local_dir.display().to_string()))?;
    if !meta.is_dir() {
        return Err(ShoalError::NotDirectory(local_dir.display().to_string()));
    }

    for entry in walkdir::WalkDir::new(local_dir) {
        let entry = entry.map_err(|e| ShoalError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(local_dir)
            .expect("walked path is under its root");
        let rel_key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let key = format!("{segment}/{rel_key}");

        let data = Bytes::from(std::fs::read(entry.path())?);
        put_with_retry(store, &key, data).await?;
    }

    Ok(())
}

/// Put one object, retrying transient failures with exponential backoff
/// (1s, 2s, 4s, capped at 8s). Every attempt re-sends the payload from the
/// beginning. Exhausting the attempts fails the whole commit.
pub async fn put_with_retry(store: &dyn SegmentStore, key: &str, data: Bytes) -> Result<()> {
    let mut last_error = None;
    for attempt in 0..MAX_UPLOAD_ATTEMPTS {
        match store.put_object(key, data.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(key = %key, attempt = attempt + 1, error = %e, "segment object upload failed");
                last_error = Some(e);
                if attempt + 1 < MAX_UPLOAD_ATTEMPTS {
                    let backoff = INITIAL_BACKOFF
                        .checked_mul(1 << attempt)
                        .unwrap_or(MAX_BACKOFF)
                        .min(MAX_BACKOFF);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(ShoalError::UploadFailed {
        key: key.to_string(),
        attempts: MAX_UPLOAD_ATTEMPTS,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

/// The newest published segment for a base name, if any.
///
/// Timestamps are fixed-width, so lexicographic order on the full name is
/// chronological order.
pub async fn latest_segment(store: &dyn SegmentStore, base: &str) -> Result<Option<String>> {
    let mut segments = store.list_segments(base).await?;
    segments.sort();
    Ok(segments.pop())
}

/// Download a whole segment into `dest_dir`, preserving relative paths
pub async fn fetch_segment(
    store: &dyn SegmentStore,
    segment: &str,
    dest_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dest_dir)?;
    for rel_key in store.list_objects(segment).await? {
        let data = store.get_object(&format!("{segment}/{rel_key}")).await?;
        let dest = dest_dir.join(rel_key.replace('/', std::path::MAIN_SEPARATOR_STR));
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, &data)?;
    }
    Ok(())
}
