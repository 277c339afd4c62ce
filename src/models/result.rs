use serde::{Deserialize, Serialize};

/// A single search hit. Identity is the `id` field alone: two results with
/// the same id are duplicates regardless of every other field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl SearchResult {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            score,
            snippet: None,
            source: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
