use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::Value as JsonValue;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::api::types::{AckResponse, BulkIndexRequest, CommitResponse, DeleteRequest, IndexRequest};
use crate::api::{prometheus_text, ApiError};
use crate::error::ShoalError;
use crate::indexer::Indexer;
use crate::metrics::ServiceMetrics;

/// Indexer application state shared across handlers
#[derive(Clone)]
pub struct IndexerState {
    pub indexer: Arc<Indexer>,
    pub metrics: Arc<ServiceMetrics>,
}

/// Indexer HTTP router: document mutations and the commit trigger
pub fn router(state: IndexerState) -> Router {
    Router::new()
        .route("/index", post(index_document))
        .route("/delete", post(delete_document))
        .route("/bulk_index", post(bulk_index))
        .route("/commit", post(commit))
        .route("/health", axum::routing::get(super::health))
        .route("/metrics", axum::routing::get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn require_object(data: &JsonValue) -> Result<&serde_json::Map<String, JsonValue>, ApiError> {
    data.as_object().ok_or_else(|| {
        ApiError(ShoalError::InvalidInput(
            "document data must be a JSON object".to_string(),
        ))
    })
}

async fn index_document(
    State(state): State<IndexerState>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    if req.id.is_empty() {
        return Err(ApiError(ShoalError::InvalidInput(
            "document id is required".to_string(),
        )));
    }
    let attrs = require_object(&req.data)?;
    state.indexer.index(&req.id, attrs).await?;
    state.metrics.record_index(1);
    Ok(Json(AckResponse::for_id(req.id)))
}

async fn delete_document(
    State(state): State<IndexerState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    if req.id.is_empty() {
        return Err(ApiError(ShoalError::InvalidInput(
            "document id is required".to_string(),
        )));
    }
    state.indexer.delete(&req.id).await?;
    state.metrics.record_delete();
    Ok(Json(AckResponse::for_id(req.id)))
}

async fn bulk_index(
    State(state): State<IndexerState>,
    Json(req): Json<BulkIndexRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    if req.is_empty() {
        return Err(ApiError(ShoalError::InvalidInput(
            "bulk index body must not be empty".to_string(),
        )));
    }
    let mut docs = BTreeMap::new();
    for (id, data) in &req {
        docs.insert(id.clone(), require_object(data)?.clone());
    }
    let count = docs.len();
    state.indexer.bulk_index(&docs).await?;
    state.metrics.record_index(count);
    Ok(Json(AckResponse::ok()))
}

async fn commit(State(state): State<IndexerState>) -> Response {
    match state.indexer.commit_and_upload().await {
        Ok(segment) => {
            state.metrics.record_commit("ok");
            (StatusCode::OK, Json(CommitResponse { segment })).into_response()
        }
        Err(e @ ShoalError::IndexLocked { .. }) => {
            state.metrics.record_commit("locked");
            ApiError(e).into_response()
        }
        Err(e) => {
            state.metrics.record_commit("error");
            error!(error = %e, "commit and upload failed");
            ApiError(e).into_response()
        }
    }
}

async fn metrics(State(state): State<IndexerState>) -> String {
    prometheus_text(&state.metrics)
}
