//! Broker service
//!
//! The broker is the read-path entry point: it runs query understanding,
//! resolves the target shards, fans the structured query out to every
//! replica of those shards, and merges the responses. Partial failures are
//! logged and absorbed; only a fully failed fan-out surfaces as an error.

pub mod fanout;
pub mod merge;
pub mod remote;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, ShoalError};
use crate::metrics::ServiceMetrics;
use crate::models::{RawQuery, SearchResult, ShardId, StructuredQuery};
use crate::planning::QueryPlanner;
use crate::searcher::ShardSearcher;

pub use remote::RemoteSearcher;

/// Turns raw queries into structured ones. The broker returns its errors
/// unwrapped.
#[async_trait]
pub trait QueryUnderstanding: Send + Sync {
    async fn process(&self, ctx: &CancellationToken, raw: &RawQuery) -> Result<StructuredQuery>;
}

/// Runs a configured planning pipeline as the broker's QU service
pub struct PlannerUnderstanding {
    planner: Arc<QueryPlanner>,
    pipeline: String,
}

impl PlannerUnderstanding {
    pub fn new(planner: Arc<QueryPlanner>, pipeline: impl Into<String>) -> Self {
        Self {
            planner,
            pipeline: pipeline.into(),
        }
    }
}

#[async_trait]
impl QueryUnderstanding for PlannerUnderstanding {
    async fn process(&self, _ctx: &CancellationToken, raw: &RawQuery) -> Result<StructuredQuery> {
        self.planner.process(raw, &self.pipeline)
    }
}

/// Shard id → replicas, grouped once at construction and immutable for the
/// broker's lifetime. Shard ids enumerate in sorted order so routing is
/// reproducible.
pub struct ShardMap {
    shards: BTreeMap<ShardId, Vec<Arc<dyn ShardSearcher>>>,
}

impl ShardMap {
    pub fn new(searchers: Vec<Arc<dyn ShardSearcher>>) -> Self {
        let mut shards: BTreeMap<ShardId, Vec<Arc<dyn ShardSearcher>>> = BTreeMap::new();
        for searcher in searchers {
            shards.entry(searcher.shard_id()).or_default().push(searcher);
        }
        Self { shards }
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.keys().copied().collect()
    }

    pub fn replicas(&self, shard: ShardId) -> &[Arc<dyn ShardSearcher>] {
        self.shards.get(&shard).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pick the shard for a first keyword: `h = h*31 + codepoint` with
/// wrapping arithmetic, absolute value, modulo the sorted shard list.
/// A pure function of `(keyword, shard_ids)`.
pub fn route_shard(keyword: &str, shard_ids: &[ShardId]) -> Option<ShardId> {
    if shard_ids.is_empty() {
        return None;
    }
    let mut hash: i64 = 0;
    for r in keyword.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(r as i64);
    }
    let index = (hash.unsigned_abs() % shard_ids.len() as u64) as usize;
    Some(shard_ids[index])
}

/// The broker: query understanding, shard routing, fan-out, merge
pub struct Broker {
    qu: Arc<dyn QueryUnderstanding>,
    shard_map: ShardMap,
    per_searcher_deadline: Option<Duration>,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl Broker {
    pub fn new(qu: Arc<dyn QueryUnderstanding>, searchers: Vec<Arc<dyn ShardSearcher>>) -> Self {
        Self {
            qu,
            shard_map: ShardMap::new(searchers),
            per_searcher_deadline: None,
            metrics: None,
        }
    }

    /// Deadline applied to each individual searcher call; expiry counts as
    /// that searcher failing
    pub fn with_per_searcher_deadline(mut self, deadline: Duration) -> Self {
        self.per_searcher_deadline = Some(deadline);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shard_map(&self) -> &ShardMap {
        &self.shard_map
    }

    /// Serve one raw query end to end.
    ///
    /// Returns an empty list when every responding shard was empty; errors
    /// only on QU failure, an unservable shard map, a fully failed
    /// fan-out, or cancellation.
    pub async fn search(&self, ctx: &CancellationToken, raw: &RawQuery) -> Result<Vec<SearchResult>> {
        // With no searchers configured there is nothing to plan for, so QU
        // never runs.
        if self.shard_map.is_empty() {
            return Err(ShoalError::NoShards);
        }

        let query = self.qu.process(ctx, raw).await?;

        let shard_ids = self.shard_map.shard_ids();
        let targets: Vec<ShardId> = match query.first_keyword() {
            Some(first) => {
                let shard = route_shard(first, &shard_ids).ok_or(ShoalError::NoShards)?;
                vec![shard]
            }
            // No keywords: broadcast to every shard.
            None => shard_ids,
        };

        let mut replicas: Vec<Arc<dyn ShardSearcher>> = Vec::new();
        for shard in &targets {
            replicas.extend_from_slice(self.shard_map.replicas(*shard));
        }
        if replicas.is_empty() {
            return Err(ShoalError::NoShards);
        }

        let outcome =
            fanout::dispatch(ctx, &replicas, &query, self.per_searcher_deadline).await?;

        if outcome.batches.is_empty() {
            let first_error = outcome
                .failures
                .first()
                .map(|(_, e)| e.to_string())
                .unwrap_or_else(|| "no searcher responded".to_string());
            return Err(ShoalError::AllShardsFailed {
                attempted: outcome.dispatched,
                first_error,
            });
        }

        // Partial failures: log and serve what we have.
        for (shard, error) in &outcome.failures {
            warn!(shard, error = %error, "searcher failed, continuing with partial results");
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_fanout(outcome.dispatched, outcome.failures.len());
        }

        let batches = outcome.batches.into_iter().map(|(_, b)| b).collect();
        let (results, dropped) = merge::merge_deduplicate(batches);
        if let Some(metrics) = &self.metrics {
            metrics.record_dedup_dropped(dropped);
        }
        Ok(results)
    }
}
