use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use crate::error::{Result, ShoalError};
use crate::storage::SegmentStore;

/// Segment store backed by an S3-compatible object store.
///
/// Credentials and region come from the standard `AWS_REGION`,
/// `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` environment variables
/// (or the ambient instance role) via the client's own env loading.
pub struct BlobSegmentStore {
    store: Box<dyn ObjectStore>,
    bucket: String,
}

impl BlobSegmentStore {
    pub fn from_env(bucket: &str) -> Result<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| {
                ShoalError::Config(format!("failed to build blob store client: {e}"))
            })?;
        Ok(Self {
            store: Box::new(store),
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn transport(e: object_store::Error) -> ShoalError {
        ShoalError::Io(std::io::Error::other(e))
    }
}

#[async_trait]
impl SegmentStore for BlobSegmentStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.store
            .put(&ObjectPath::from(key), data.into())
            .await
            .map_err(Self::transport)?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .map_err(Self::transport)?;
        result.bytes().await.map_err(Self::transport)
    }

    async fn list_segments(&self, base: &str) -> Result<Vec<String>> {
        let listing = self
            .store
            .list_with_delimiter(None)
            .await
            .map_err(Self::transport)?;
        let prefix = format!("{base}_");
        Ok(listing
            .common_prefixes
            .into_iter()
            .map(|p| p.to_string())
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }

    async fn list_objects(&self, segment: &str) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(segment);
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(Self::transport)?;
        let strip = format!("{segment}/");
        Ok(metas
            .into_iter()
            .filter_map(|meta| {
                let full = meta.location.to_string();
                full.strip_prefix(&strip).map(str::to_string)
            })
            .collect())
    }
}
