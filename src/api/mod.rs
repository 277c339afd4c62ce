//! HTTP surface of the three services
//!
//! One router module per service, sharing the error mapping and the
//! health/metrics endpoints.

pub mod broker;
pub mod indexer;
pub mod searcher;
pub mod types;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use prometheus::{Encoder, TextEncoder};

use crate::error::ShoalError;
use crate::metrics::ServiceMetrics;
use self::types::{ErrorResponse, HealthResponse};

/// Error wrapper translating `ShoalError` into HTTP responses
pub struct ApiError(pub ShoalError);

impl From<ShoalError> for ApiError {
    fn from(e: ShoalError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_type = match &self.0 {
            ShoalError::InvalidInput(_) => "invalid_input",
            ShoalError::Config(_) => "config_error",
            ShoalError::Stage { .. } => "stage_error",
            ShoalError::Expression { .. } => "expression_error",
            ShoalError::NoShards => "no_shards",
            ShoalError::AllShardsFailed { .. } => "all_shards_failed",
            ShoalError::SearcherFailed { .. } => "searcher_failed",
            ShoalError::IndexLocked { .. } => "index_locked",
            ShoalError::PathMissing(_) => "path_missing",
            ShoalError::NotDirectory(_) => "not_directory",
            ShoalError::UploadFailed { .. } => "upload_failed",
            ShoalError::Cancelled => "cancelled",
            ShoalError::Io(_) => "io_error",
            ShoalError::Engine(_) => "engine_error",
        };
        let body = ErrorResponse::new(error_type, self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Prometheus text exposition of a registry
pub fn prometheus_text(metrics: &ServiceMetrics) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&metrics.registry().gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let resp = ApiError(ShoalError::InvalidInput("q".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError(ShoalError::IndexLocked {
            lock_path: "l".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError(ShoalError::NoShards).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = ApiError(ShoalError::Cancelled).into_response();
        assert_eq!(resp.status().as_u16(), 499);
    }

    #[test]
    fn test_prometheus_text_renders() {
        let metrics = ServiceMetrics::new().unwrap();
        metrics.record_search("ok", 0.01);
        let text = prometheus_text(&metrics);
        assert!(text.contains("shoal_searches_total"));
    }
}
