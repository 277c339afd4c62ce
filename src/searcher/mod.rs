//! Searcher service
//!
//! A searcher replica is bound to one shard. It serves queries from a local
//! tantivy snapshot and runs a background refresh task that downloads newer
//! segments from the segment store and atomically swaps them in. Reads are
//! never blocked by a swap: the old snapshot stays readable until the new
//! `Arc` is published.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, FieldType, IndexRecordOption, Value};
use tantivy::{Index, IndexReader, TantivyDocument, Term};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ShoalError};
use crate::indexer::mapping::{IndexMapping, ID_FIELD};
use crate::models::{SearchResult, ShardId, StructuredQuery};
use crate::storage::{self, SegmentStore};

/// Default cadence of the segment refresh task
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

const DEFAULT_RESULT_LIMIT: usize = 10;

/// A shard-bound search endpoint the broker can fan out to.
///
/// The cancellation token comes first on the read path; implementations
/// must return promptly with `Cancelled` once it fires.
#[async_trait]
pub trait ShardSearcher: Send + Sync {
    async fn search(
        &self,
        ctx: &CancellationToken,
        query: &StructuredQuery,
    ) -> Result<Vec<SearchResult>>;

    fn shard_id(&self) -> ShardId;
}

/// Lifecycle of a searcher replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplicaState {
    Initializing,
    Serving { segment: Option<String> },
    Swapping,
    Draining,
    Closed,
}

/// One immutable serving snapshot: an opened index plus resolved fields
struct Snapshot {
    segment: Option<String>,
    reader: IndexReader,
    id_field: Field,
    title_field: Option<Field>,
    url_field: Option<Field>,
    search_fields: Vec<Field>,
}

impl Snapshot {
    fn from_index(index: Index, segment: Option<String>) -> Result<Self> {
        let schema = index.schema();
        let id_field = schema
            .get_field(ID_FIELD)
            .map_err(|_| ShoalError::Engine("segment schema is missing the id field".to_string()))?;

        let mut search_fields = Vec::new();
        for (field, entry) in schema.fields() {
            if field == id_field {
                continue;
            }
            if let FieldType::Str(options) = entry.field_type() {
                if options.get_indexing_options().is_some() {
                    search_fields.push(field);
                }
            }
        }

        let reader = index.reader()?;
        Ok(Self {
            segment,
            reader,
            id_field,
            title_field: schema.get_field("title").ok(),
            url_field: schema.get_field("url").ok(),
            search_fields,
        })
    }

    fn empty(mapping: &IndexMapping) -> Result<Self> {
        let (schema, _fields) = mapping.build_schema();
        Self::from_index(Index::create_in_ram(schema), None)
    }

    fn open_segment(dir: &std::path::Path, segment: String) -> Result<Self> {
        Self::from_index(Index::open_in_dir(dir)?, Some(segment))
    }
}

/// A searcher replica serving one shard from a locally materialized index
pub struct LocalSearcher {
    shard_id: ShardId,
    base_name: String,
    cache_dir: PathBuf,
    store: Arc<dyn SegmentStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    state: Mutex<ReplicaState>,
    result_limit: usize,
}

impl LocalSearcher {
    /// Create a replica with an empty in-memory snapshot. Call
    /// `refresh_once` (or start the refresh loop) to pull the latest
    /// published segment.
    pub fn open(
        shard_id: ShardId,
        base_name: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        store: Arc<dyn SegmentStore>,
        mapping: &IndexMapping,
    ) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let snapshot = Snapshot::empty(mapping)?;
        let searcher = Self {
            shard_id,
            base_name: base_name.into(),
            cache_dir,
            store,
            snapshot: RwLock::new(Arc::new(snapshot)),
            state: Mutex::new(ReplicaState::Initializing),
            result_limit: DEFAULT_RESULT_LIMIT,
        };
        searcher.set_state(ReplicaState::Serving { segment: None });
        Ok(searcher)
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub fn state(&self) -> ReplicaState {
        self.state.lock().clone()
    }

    /// Segment version currently being served, if any
    pub fn serving_segment(&self) -> Option<String> {
        self.snapshot.read().segment.clone()
    }

    fn set_state(&self, state: ReplicaState) {
        *self.state.lock() = state;
    }

    /// One refresh attempt: download the newest segment if it differs from
    /// the serving one and swap it in. Returns whether a swap happened.
    pub async fn refresh_once(&self) -> Result<bool> {
        let latest = storage::latest_segment(self.store.as_ref(), &self.base_name).await?;
        let Some(latest) = latest else {
            return Ok(false);
        };
        if self.serving_segment().as_deref() == Some(latest.as_str()) {
            return Ok(false);
        }

        self.set_state(ReplicaState::Swapping);
        let outcome = self.download_and_swap(&latest).await;
        // Whatever happened, we are serving again: either the new snapshot
        // or the last-good one.
        self.set_state(ReplicaState::Serving {
            segment: self.serving_segment(),
        });
        outcome.map(|_| true)
    }

    async fn download_and_swap(&self, segment: &str) -> Result<()> {
        let dest = self.cache_dir.join(segment);
        if !dest.join("meta.json").exists() {
            storage::fetch_segment(self.store.as_ref(), segment, &dest).await?;
        }
        let snapshot = Snapshot::open_segment(&dest, segment.to_string())?;
        *self.snapshot.write() = Arc::new(snapshot);
        info!(shard = self.shard_id, segment = %segment, "swapped in new segment");
        Ok(())
    }

    /// Background refresh task. Runs until the shutdown token fires, then
    /// drains and closes the replica.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; consume it
        // so the loop waits a full period before its first check.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(true) => {}
                        Ok(false) => debug!(shard = self.shard_id, "no newer segments"),
                        Err(e) => {
                            warn!(shard = self.shard_id, error = %e, "segment refresh failed, serving last-good snapshot");
                        }
                    }
                }
            }
        }

        self.set_state(ReplicaState::Draining);
        info!(shard = self.shard_id, "refresh loop stopped");
        self.set_state(ReplicaState::Closed);
    }

    fn to_result(&self, snapshot: &Snapshot, doc: &TantivyDocument, score: f32) -> Option<SearchResult> {
        let id = doc
            .get_first(snapshot.id_field)
            .and_then(|v| v.as_str())?
            .to_string();
        let text_of = |field: Option<Field>| {
            field
                .and_then(|f| doc.get_first(f))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let mut result = SearchResult::new(
            id,
            text_of(snapshot.title_field),
            text_of(snapshot.url_field),
            score as f64,
        );
        if let Some(segment) = &snapshot.segment {
            result = result.with_source(segment.clone());
        }
        Some(result)
    }
}

#[async_trait]
impl ShardSearcher for LocalSearcher {
    /// Translate the structured query into a match-any term query over the
    /// snapshot's indexed string fields and map the hits back out.
    async fn search(
        &self,
        ctx: &CancellationToken,
        query: &StructuredQuery,
    ) -> Result<Vec<SearchResult>> {
        if ctx.is_cancelled() {
            return Err(ShoalError::Cancelled);
        }
        if query.keywords.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot.read().clone();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for keyword in &query.keywords {
            // The default analyzer lowercases at index time; fold here so
            // mixed-case keywords still match.
            let keyword = keyword.to_lowercase();
            for field in &snapshot.search_fields {
                clauses.push((
                    Occur::Should,
                    Box::new(TermQuery::new(
                        Term::from_field_text(*field, &keyword),
                        IndexRecordOption::WithFreqs,
                    )),
                ));
            }
        }

        let searcher = snapshot.reader.searcher();
        let top_docs = searcher
            .search(&BooleanQuery::new(clauses), &TopDocs::with_limit(self.result_limit))
            .map_err(|e| ShoalError::Engine(e.to_string()))?;

        if ctx.is_cancelled() {
            return Err(ShoalError::Cancelled);
        }

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| ShoalError::Engine(e.to_string()))?;
            if let Some(result) = self.to_result(&snapshot, &doc, score) {
                results.push(result);
            }
        }
        Ok(results)
    }

    fn shard_id(&self) -> ShardId {
        self.shard_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::storage::LocalSegmentStore;
    use serde_json::json;
    use tempfile::TempDir;

    async fn publish_docs(
        store: Arc<LocalSegmentStore>,
        index_dir: &std::path::Path,
        docs: &[(&str, serde_json::Value)],
    ) -> String {
        let indexer = Indexer::open(index_dir, IndexMapping::default(), vec![], store).unwrap();
        for (id, data) in docs {
            indexer
                .index(id, data.as_object().unwrap())
                .await
                .unwrap();
        }
        let segment = indexer.commit_and_upload().await.unwrap();
        indexer.close().await.unwrap();
        segment
    }

    #[tokio::test]
    async fn test_empty_replica_serves_empty_results() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
        let searcher = LocalSearcher::open(
            0,
            "corpus",
            tmp.path().join("cache"),
            store,
            &IndexMapping::default(),
        )
        .unwrap();

        let ctx = CancellationToken::new();
        let results = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["anything".into()]))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(searcher.state(), ReplicaState::Serving { segment: None });
    }

    #[tokio::test]
    async fn test_refresh_swaps_in_published_segment() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
        let segment = publish_docs(
            store.clone(),
            &tmp.path().join("corpus"),
            &[("doc1", json!({"title": "rust search engine", "url": "http://x/1"}))],
        )
        .await;

        let searcher = LocalSearcher::open(
            3,
            "corpus",
            tmp.path().join("cache"),
            store,
            &IndexMapping::default(),
        )
        .unwrap();

        assert!(searcher.refresh_once().await.unwrap());
        assert_eq!(searcher.serving_segment(), Some(segment.clone()));
        // A second refresh sees nothing newer.
        assert!(!searcher.refresh_once().await.unwrap());

        let ctx = CancellationToken::new();
        let results = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["rust".into()]))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "doc1");
        assert_eq!(results[0].title, "rust search engine");
        assert_eq!(results[0].source.as_deref(), Some(segment.as_str()));
    }

    #[tokio::test]
    async fn test_upsert_visible_after_swap_returns_latest_version() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
        let index_dir = tmp.path().join("corpus");

        let indexer = Indexer::open(
            &index_dir,
            IndexMapping::default(),
            vec![],
            store.clone(),
        )
        .unwrap();
        indexer
            .index("d", json!({"title": "first version"}).as_object().unwrap())
            .await
            .unwrap();
        indexer
            .index("d", json!({"title": "second version"}).as_object().unwrap())
            .await
            .unwrap();
        indexer.commit_and_upload().await.unwrap();
        indexer.close().await.unwrap();

        let searcher = LocalSearcher::open(
            0,
            "corpus",
            tmp.path().join("cache"),
            store,
            &IndexMapping::default(),
        )
        .unwrap();
        searcher.refresh_once().await.unwrap();

        let ctx = CancellationToken::new();
        let results = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["version".into()]))
            .await
            .unwrap();
        assert_eq!(results.len(), 1, "only the upserted version is visible");
        assert_eq!(results[0].title, "second version");
    }

    #[tokio::test]
    async fn test_cancelled_context_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
        let searcher = LocalSearcher::open(
            0,
            "corpus",
            tmp.path().join("cache"),
            store,
            &IndexMapping::default(),
        )
        .unwrap();

        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["x".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShoalError::Cancelled));
    }

    #[tokio::test]
    async fn test_refresh_loop_shuts_down_to_closed() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
        let searcher = Arc::new(
            LocalSearcher::open(
                0,
                "corpus",
                tmp.path().join("cache"),
                store,
                &IndexMapping::default(),
            )
            .unwrap(),
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(searcher.clone().run_refresh_loop(
            Duration::from_secs(300),
            shutdown.clone(),
        ));
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(searcher.state(), ReplicaState::Closed);
    }
}
