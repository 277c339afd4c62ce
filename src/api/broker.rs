use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::types::SearchParams;
use crate::api::{prometheus_text, ApiError};
use crate::broker::Broker;
use crate::error::ShoalError;
use crate::metrics::ServiceMetrics;
use crate::models::RawQuery;

/// Broker application state shared across handlers
#[derive(Clone)]
pub struct BrokerState {
    pub broker: Arc<Broker>,
    pub metrics: Arc<ServiceMetrics>,
}

/// Broker HTTP router: `GET /search?q=` plus health and metrics
pub fn router(state: BrokerState) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/health", get(super::health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn search(State(state): State<BrokerState>, Query(params): Query<SearchParams>) -> Response {
    let start = Instant::now();
    let Some(q) = params.q else {
        state.metrics.record_search("invalid_input", start.elapsed().as_secs_f64());
        return ApiError(ShoalError::InvalidInput(
            "missing 'q' query parameter".to_string(),
        ))
        .into_response();
    };

    // If the client goes away axum drops this future; the guard then fires
    // the token and every in-flight searcher call gets the cancel signal.
    let ctx = CancellationToken::new();
    let _cancel_on_drop = ctx.clone().drop_guard();

    match state.broker.search(&ctx, &RawQuery::new(q)).await {
        Ok(results) => {
            state.metrics.record_search("ok", start.elapsed().as_secs_f64());
            (StatusCode::OK, Json(results)).into_response()
        }
        Err(e) => {
            state
                .metrics
                .record_search(outcome_label(&e), start.elapsed().as_secs_f64());
            ApiError(e).into_response()
        }
    }
}

fn outcome_label(e: &ShoalError) -> &'static str {
    match e {
        ShoalError::InvalidInput(_) => "invalid_input",
        ShoalError::NoShards => "no_shards",
        ShoalError::AllShardsFailed { .. } => "all_shards_failed",
        ShoalError::Cancelled => "cancelled",
        _ => "error",
    }
}

async fn metrics(State(state): State<BrokerState>) -> String {
    prometheus_text(&state.metrics)
}
