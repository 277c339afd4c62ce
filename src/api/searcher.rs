use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::api::types::{SearcherSearchResponse, SearchParams};
use crate::api::{prometheus_text, ApiError};
use crate::error::ShoalError;
use crate::metrics::ServiceMetrics;
use crate::models::StructuredQuery;
use crate::searcher::{LocalSearcher, ShardSearcher};

/// Searcher application state shared across handlers
#[derive(Clone)]
pub struct SearcherState {
    pub searcher: Arc<LocalSearcher>,
    pub metrics: Arc<ServiceMetrics>,
}

/// Searcher HTTP router serving its shard's queries
pub fn router(state: SearcherState) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/health", get(super::health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn search(State(state): State<SearcherState>, Query(params): Query<SearchParams>) -> Response {
    let start = std::time::Instant::now();
    let Some(q) = params.q else {
        return ApiError(ShoalError::InvalidInput(
            "missing 'q' query parameter".to_string(),
        ))
        .into_response();
    };

    // Accept either a raw string or the broker's space-joined keywords;
    // both shapes reduce to whitespace-separated terms here.
    let query = StructuredQuery::from_keywords(q.split_whitespace().map(str::to_string).collect());

    let ctx = CancellationToken::new();
    let _cancel_on_drop = ctx.clone().drop_guard();

    match state.searcher.search(&ctx, &query).await {
        Ok(results) => {
            state.metrics.record_search("ok", start.elapsed().as_secs_f64());
            let total_hits = results.len() as u64;
            Json(SearcherSearchResponse {
                query: q,
                results,
                total_hits,
            })
            .into_response()
        }
        Err(e) => {
            state.metrics.record_search("error", start.elapsed().as_secs_f64());
            ApiError(e).into_response()
        }
    }
}

async fn metrics(State(state): State<SearcherState>) -> String {
    prometheus_text(&state.metrics)
}
