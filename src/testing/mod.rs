//! Scripted test doubles for the read path.
//!
//! Used by the unit tests in this crate and the integration tests under
//! `tests/`; nothing here ships in a service binary's hot path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::broker::QueryUnderstanding;
use crate::error::{Result, ShoalError};
use crate::models::{RawQuery, SearchResult, ShardId, StructuredQuery};
use crate::searcher::ShardSearcher;

/// A shard searcher with scripted results, failures, and latency
pub struct MockSearcher {
    shard_id: ShardId,
    results: Vec<SearchResult>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSearcher {
    pub fn new(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            results: Vec::new(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Respond with fixed `(id, title)` hits
    pub fn with_results(mut self, results: Vec<(&str, &str)>) -> Self {
        self.results = results
            .into_iter()
            .map(|(id, title)| {
                SearchResult::new(id, title, format!("http://example.com/{id}"), 1.0)
            })
            .collect();
        self
    }

    pub fn with_full_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = results;
        self
    }

    /// Always fail with the given message
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Sleep before responding; cancellation interrupts the sleep
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardSearcher for MockSearcher {
    async fn search(
        &self,
        ctx: &CancellationToken,
        _query: &StructuredQuery,
    ) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = ctx.cancelled() => return Err(ShoalError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if ctx.is_cancelled() {
            return Err(ShoalError::Cancelled);
        }
        if let Some(message) = &self.failure {
            return Err(ShoalError::SearcherFailed {
                shard: self.shard_id,
                message: message.clone(),
            });
        }
        Ok(self.results.clone())
    }

    fn shard_id(&self) -> ShardId {
        self.shard_id
    }
}

/// A QU service that returns fixed keywords, or always fails
pub struct MockUnderstanding {
    keywords: Option<Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl MockUnderstanding {
    pub fn keywords(keywords: &[&str]) -> Self {
        Self {
            keywords: Some(keywords.iter().map(|s| s.to_string()).collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            keywords: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, usable after the mock moves into the broker
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl QueryUnderstanding for MockUnderstanding {
    async fn process(&self, _ctx: &CancellationToken, _raw: &RawQuery) -> Result<StructuredQuery> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.keywords {
            Some(keywords) => Ok(StructuredQuery::from_keywords(keywords.clone())),
            None => Err(ShoalError::InvalidInput("scripted QU failure".to_string())),
        }
    }
}
