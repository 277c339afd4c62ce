//! Field mapping for the local text index
//!
//! The mapping file is JSON and translates document attributes into engine
//! fields. A missing or unreadable file falls back to a built-in default;
//! that is logged, never fatal.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tantivy::schema::{
    Field, Schema, SchemaBuilder, FAST, INDEXED, STORED, STRING, TEXT,
};
use tantivy::TantivyDocument;
use tracing::{debug, warn};

use crate::config::FieldKind;
use crate::error::{Result, ShoalError};

/// Reserved field carrying the document identifier; always present
pub const ID_FIELD: &str = "id";

/// One attribute-to-field mapping
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub indexed: bool,
    #[serde(default)]
    pub stored: bool,
}

fn default_true() -> bool {
    true
}

/// The full mapping loaded from the mapping file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexMapping {
    pub fields: Vec<FieldMapping>,
}

impl Default for IndexMapping {
    /// Built-in fallback: a generic web-document shape
    fn default() -> Self {
        let field = |name: &str, kind: FieldKind, stored: bool| FieldMapping {
            name: name.to_string(),
            kind,
            indexed: true,
            stored,
        };
        Self {
            fields: vec![
                field("title", FieldKind::Text, true),
                field("body", FieldKind::Text, false),
                field("url", FieldKind::String, true),
                field("tags", FieldKind::String, false),
            ],
        }
    }
}

impl IndexMapping {
    /// Load the mapping file, falling back to the default on any failure
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(mapping) => mapping,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid mapping file, using default mapping");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "mapping file unreadable, using default mapping");
                Self::default()
            }
        }
    }

    /// Build the engine schema. The reserved `id` field is always added as
    /// an indexed, stored keyword so upserts and deletes can address it.
    pub fn build_schema(&self) -> (Schema, MappedFields) {
        let mut builder = SchemaBuilder::new();
        let id = builder.add_text_field(ID_FIELD, STRING | STORED);

        let mut fields = Vec::with_capacity(self.fields.len());
        for mapping in &self.fields {
            let field = match mapping.kind {
                FieldKind::Text => {
                    let mut options = TEXT;
                    if mapping.stored {
                        options = options | STORED;
                    }
                    builder.add_text_field(&mapping.name, options)
                }
                FieldKind::String => {
                    let mut options = STRING;
                    if mapping.stored {
                        options = options | STORED;
                    }
                    builder.add_text_field(&mapping.name, options)
                }
                FieldKind::Integer => match (mapping.indexed, mapping.stored) {
                    (true, true) => builder.add_i64_field(&mapping.name, FAST | INDEXED | STORED),
                    (true, false) => builder.add_i64_field(&mapping.name, FAST | INDEXED),
                    (false, true) => builder.add_i64_field(&mapping.name, FAST | STORED),
                    (false, false) => builder.add_i64_field(&mapping.name, FAST),
                },
                FieldKind::Float => match (mapping.indexed, mapping.stored) {
                    (true, true) => builder.add_f64_field(&mapping.name, FAST | INDEXED | STORED),
                    (true, false) => builder.add_f64_field(&mapping.name, FAST | INDEXED),
                    (false, true) => builder.add_f64_field(&mapping.name, FAST | STORED),
                    (false, false) => builder.add_f64_field(&mapping.name, FAST),
                },
                FieldKind::Boolean => match (mapping.indexed, mapping.stored) {
                    (true, true) => builder.add_bool_field(&mapping.name, FAST | INDEXED | STORED),
                    (true, false) => builder.add_bool_field(&mapping.name, FAST | INDEXED),
                    (false, true) => builder.add_bool_field(&mapping.name, FAST | STORED),
                    (false, false) => builder.add_bool_field(&mapping.name, FAST),
                },
                FieldKind::Datetime => {
                    let mut options = tantivy::schema::DateOptions::default().set_fast();
                    if mapping.indexed {
                        options = options.set_indexed();
                    }
                    if mapping.stored {
                        options = options.set_stored();
                    }
                    builder.add_date_field(&mapping.name, options)
                }
            };
            fields.push((mapping.clone(), field));
        }

        let schema = builder.build();
        (schema, MappedFields { id, fields })
    }
}

/// Resolved engine fields for one schema
#[derive(Clone)]
pub struct MappedFields {
    pub id: Field,
    fields: Vec<(FieldMapping, Field)>,
}

impl MappedFields {
    /// Convert a JSON attribute map into an engine document.
    ///
    /// Attributes without a mapping are ignored; mapped attributes whose
    /// value does not fit the declared type are skipped with a debug log,
    /// mirroring a dynamic-mapping engine's lenient behavior.
    pub fn to_document(&self, id: &str, attrs: &serde_json::Map<String, Json>) -> Result<TantivyDocument> {
        if id.is_empty() {
            return Err(ShoalError::InvalidInput("document id must not be empty".to_string()));
        }
        let mut doc = TantivyDocument::new();
        doc.add_text(self.id, id);

        for (mapping, field) in &self.fields {
            let Some(value) = attrs.get(&mapping.name) else {
                continue;
            };
            let accepted = match mapping.kind {
                FieldKind::Text | FieldKind::String => match value {
                    Json::String(s) => {
                        doc.add_text(*field, s);
                        true
                    }
                    Json::Number(n) => {
                        doc.add_text(*field, n.to_string());
                        true
                    }
                    _ => false,
                },
                FieldKind::Integer => match value.as_i64() {
                    Some(i) => {
                        doc.add_i64(*field, i);
                        true
                    }
                    None => false,
                },
                FieldKind::Float => match value.as_f64() {
                    Some(f) => {
                        doc.add_f64(*field, f);
                        true
                    }
                    None => false,
                },
                FieldKind::Boolean => match value.as_bool() {
                    Some(b) => {
                        doc.add_bool(*field, b);
                        true
                    }
                    None => false,
                },
                FieldKind::Datetime => match value.as_str().and_then(|s| {
                    chrono::DateTime::parse_from_rfc3339(s).ok()
                }) {
                    Some(dt) => {
                        doc.add_date(
                            *field,
                            tantivy::DateTime::from_timestamp_secs(dt.timestamp()),
                        );
                        true
                    }
                    None => false,
                },
            };
            if !accepted {
                debug!(
                    field = %mapping.name,
                    document = id,
                    "attribute value does not match mapped type, skipping"
                );
            }
        }

        Ok(doc)
    }
}
