use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ShoalError};
use crate::models::{SearchResult, ShardId, StructuredQuery};
use crate::searcher::ShardSearcher;

/// What came back from one fan-out round
#[derive(Debug)]
pub struct FanoutOutcome {
    /// Per-searcher result batches in arrival order
    pub batches: Vec<(ShardId, Vec<SearchResult>)>,
    /// Failed searchers with their errors, bounded by the dispatch count
    pub failures: Vec<(ShardId, ShoalError)>,
    pub dispatched: usize,
}

/// Dispatch the query to every given searcher concurrently and gather all
/// responses.
///
/// Each call runs in its own task under a child of the request token, so a
/// request-level cancel reaches every in-flight call. The collection
/// channel is sized to the dispatch count, so producers never block on a
/// slow collector. Returns `Cancelled` once all outstanding calls have
/// observed a fired request token.
pub async fn dispatch(
    ctx: &CancellationToken,
    searchers: &[Arc<dyn ShardSearcher>],
    query: &StructuredQuery,
    per_call_deadline: Option<Duration>,
) -> Result<FanoutOutcome> {
    let dispatched = searchers.len();
    if dispatched == 0 {
        return Ok(FanoutOutcome {
            batches: Vec::new(),
            failures: Vec::new(),
            dispatched: 0,
        });
    }

    let (tx, mut rx) = mpsc::channel::<(ShardId, Result<Vec<SearchResult>>)>(dispatched);

    for searcher in searchers {
        let searcher = searcher.clone();
        let query = query.clone();
        let call_ctx = ctx.child_token();
        let tx = tx.clone();
        tokio::spawn(async move {
            let shard = searcher.shard_id();
            let call = searcher.search(&call_ctx, &query);
            let outcome = match per_call_deadline {
                Some(deadline) => match tokio::time::timeout(deadline, call).await {
                    Ok(result) => result,
                    Err(_) => Err(ShoalError::SearcherFailed {
                        shard,
                        message: format!("deadline of {deadline:?} exceeded"),
                    }),
                },
                None => call.await,
            };
            let _ = tx.send((shard, outcome)).await;
        });
    }
    drop(tx);

    let mut batches = Vec::new();
    let mut failures = Vec::new();
    while let Some((shard, outcome)) = rx.recv().await {
        match outcome {
            Ok(results) => batches.push((shard, results)),
            Err(e) => failures.push((shard, e)),
        }
    }

    if ctx.is_cancelled() {
        return Err(ShoalError::Cancelled);
    }

    Ok(FanoutOutcome {
        batches,
        failures,
        dispatched,
    })
}
