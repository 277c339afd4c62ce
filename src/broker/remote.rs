use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::types::SearcherSearchResponse;
use crate::error::{Result, ShoalError};
use crate::models::{SearchResult, ShardId, StructuredQuery};
use crate::searcher::ShardSearcher;

/// A searcher replica reached over HTTP.
///
/// The broker holds one of these per configured replica endpoint. The
/// transported query is the space-joined keyword string the searcher
/// service accepts on `GET /search`.
pub struct RemoteSearcher {
    shard_id: ShardId,
    endpoint: String,
    client: reqwest::Client,
    request_timeout: Option<Duration>,
}

impl RemoteSearcher {
    pub fn new(shard_id: ShardId, endpoint: impl Into<String>) -> Self {
        Self {
            shard_id,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            request_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, query: &StructuredQuery) -> std::result::Result<Vec<SearchResult>, reqwest::Error> {
        let mut request = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("q", query.keyword_string())]);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?.error_for_status()?;
        let body: SearcherSearchResponse = response.json().await?;
        Ok(body.results)
    }
}

#[async_trait]
impl ShardSearcher for RemoteSearcher {
    async fn search(
        &self,
        ctx: &CancellationToken,
        query: &StructuredQuery,
    ) -> Result<Vec<SearchResult>> {
        tokio::select! {
            _ = ctx.cancelled() => Err(ShoalError::Cancelled),
            outcome = self.call(query) => outcome.map_err(|e| ShoalError::SearcherFailed {
                shard: self.shard_id,
                message: format!("{} unreachable or errored: {e}", self.endpoint),
            }),
        }
    }

    fn shard_id(&self) -> ShardId {
        self.shard_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalized() {
        let searcher = RemoteSearcher::new(2, "http://replica-1:8081/");
        assert_eq!(searcher.endpoint(), "http://replica-1:8081");
        assert_eq!(searcher.shard_id(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let searcher = RemoteSearcher::new(0, "http://127.0.0.1:1");
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["q".into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShoalError::Cancelled));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_searcher_failure() {
        // Port 1 is never listening; the connect error must surface as a
        // shard-tagged failure, not a panic or a transport type.
        let searcher = RemoteSearcher::new(4, "http://127.0.0.1:1");
        let ctx = CancellationToken::new();
        let err = searcher
            .search(&ctx, &StructuredQuery::from_keywords(vec!["q".into()]))
            .await
            .unwrap_err();
        match err {
            ShoalError::SearcherFailed { shard, .. } => assert_eq!(shard, 4),
            other => panic!("expected SearcherFailed, got {other}"),
        }
    }
}
