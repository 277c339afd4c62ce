use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw user-supplied query string, untouched by any processing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuery(String);

impl RawQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self(q.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RawQuery {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RawQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query after understanding: ordered keywords plus optional filter and
/// intent metadata. Read-only once the planner emits it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl StructuredQuery {
    /// Build a query from keywords only
    pub fn from_keywords(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            ..Default::default()
        }
    }

    pub fn first_keyword(&self) -> Option<&str> {
        self.keywords.first().map(String::as_str)
    }

    /// Keywords re-joined for transports that carry a single query string
    pub fn keyword_string(&self) -> String {
        self.keywords.join(" ")
    }
}
