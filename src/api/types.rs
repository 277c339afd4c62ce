use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::models::SearchResult;

/// Query-string parameters of the search endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Request to upsert one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Json,
}

/// Request to delete one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: String,
}

/// Bulk upsert body: document id → attributes
pub type BulkIndexRequest = BTreeMap<String, Json>;

/// Generic write acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            id: None,
        }
    }

    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            id: Some(id.into()),
        }
    }
}

/// Response of `POST /commit`: the published segment name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub segment: String,
}

/// Response body of the searcher's `GET /search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearcherSearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total_hits: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// API error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
