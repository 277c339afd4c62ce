use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShoalError};

/// Field data types accepted by index schemas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
}

/// A field within an index schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
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

/// A named schema: an ordered list of field definitions
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

/// Result types a computed-field expression may produce
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputedKind {
    String,
    Integer,
    Float,
    Boolean,
}

/// A field whose value is derived from an expression over the document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputedField {
    pub name: String,
    pub expression: String,
    #[serde(rename = "type")]
    pub kind: ComputedKind,
}

/// An ordered list of stage names applied to a raw query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryPipeline {
    pub name: String,
    pub steps: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Root service configuration: schemas, computed fields, and planning
/// pipelines. Loaded from YAML at startup; parse errors are fatal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexConfiguration {
    #[serde(default)]
    pub index_schemas: Vec<IndexSchema>,
    #[serde(default)]
    pub computed_fields: Vec<ComputedField>,
    #[serde(default)]
    pub query_planning_pipelines: Vec<QueryPipeline>,
}

impl IndexConfiguration {
    /// Load and validate a configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            ShoalError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&data)
    }

    /// Parse and validate a configuration from YAML text
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: IndexConfiguration = serde_yaml::from_str(data)
            .map_err(|e| ShoalError::Config(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Re-emit the configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ShoalError::Config(format!("failed to serialize configuration: {e}")))
    }

    /// Look up a pipeline by name
    pub fn pipeline(&self, name: &str) -> Option<&QueryPipeline> {
        self.query_planning_pipelines.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_schemas.is_empty() {
            return Err(ShoalError::Config(
                "at least one index schema must be defined".to_string(),
            ));
        }
        for schema in &self.index_schemas {
            if schema.name.is_empty() {
                return Err(ShoalError::Config("index schema name cannot be empty".to_string()));
            }
            if schema.fields.is_empty() {
                return Err(ShoalError::Config(format!(
                    "index schema '{}' must define at least one field",
                    schema.name
                )));
            }
            let mut seen = HashSet::new();
            for field in &schema.fields {
                if field.name.is_empty() {
                    return Err(ShoalError::Config(format!(
                        "field name in schema '{}' cannot be empty",
                        schema.name
                    )));
                }
                if !seen.insert(field.name.as_str()) {
                    return Err(ShoalError::Config(format!(
                        "duplicate field '{}' in schema '{}'",
                        field.name, schema.name
                    )));
                }
            }
        }

        for cf in &self.computed_fields {
            if cf.name.is_empty() {
                return Err(ShoalError::Config("computed field name cannot be empty".to_string()));
            }
            if cf.expression.is_empty() {
                return Err(ShoalError::Config(format!(
                    "computed field '{}' must have an expression",
                    cf.name
                )));
            }
        }

        for pipeline in &self.query_planning_pipelines {
            if pipeline.name.is_empty() {
                return Err(ShoalError::Config(
                    "query planning pipeline name cannot be empty".to_string(),
                ));
            }
            if pipeline.steps.is_empty() {
                return Err(ShoalError::Config(format!(
                    "query planning pipeline '{}' must define at least one step",
                    pipeline.name
                )));
            }
            for step in &pipeline.steps {
                if step.is_empty() {
                    return Err(ShoalError::Config(format!(
                        "query planning pipeline '{}' contains an empty step",
                        pipeline.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Stopwords file: `stopwords: [a, the, ...]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StopwordList {
    #[serde(default)]
    pub stopwords: Vec<String>,
}

impl StopwordList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            ShoalError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&data)
            .map_err(|e| ShoalError::Config(format!("failed to parse stopwords file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
indexSchemas:
  - name: documents
    fields:
      - name: title
        type: text
        indexed: true
        stored: true
      - name: body
        type: text
      - name: views
        type: integer
        stored: true
computedFields:
  - name: popular
    expression: "views > 1000"
    type: boolean
queryPlanningPipelines:
  - name: default_pipeline
    steps: [lowercase, tokenize, remove_stopwords]
    enabled: true
"#;

    #[test]
    fn test_parse_sample() {
        let config = IndexConfiguration::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.index_schemas.len(), 1);
        assert_eq!(config.index_schemas[0].fields.len(), 3);
        assert_eq!(config.index_schemas[0].fields[2].kind, FieldKind::Integer);
        assert_eq!(config.computed_fields[0].kind, ComputedKind::Boolean);
        assert!(config.pipeline("default_pipeline").is_some());
        assert!(config.pipeline("missing").is_none());
    }

    #[test]
    fn test_indexed_defaults_true_stored_defaults_false() {
        let config = IndexConfiguration::from_yaml(SAMPLE).unwrap();
        let body = &config.index_schemas[0].fields[1];
        assert!(body.indexed);
        assert!(!body.stored);
    }

    #[test]
    fn test_empty_schema_list_rejected() {
        let err = IndexConfiguration::from_yaml("queryPlanningPipelines: []").unwrap_err();
        assert!(err.to_string().contains("at least one index schema"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let yaml = r#"
indexSchemas:
  - name: s
    fields:
      - {name: a, type: text}
      - {name: a, type: string}
"#;
        let err = IndexConfiguration::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'a'"));
    }

    #[test]
    fn test_pipeline_without_steps_rejected() {
        let yaml = r#"
indexSchemas:
  - name: s
    fields: [{name: a, type: text}]
queryPlanningPipelines:
  - name: empty
    steps: []
"#;
        let err = IndexConfiguration::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn test_yaml_round_trip_is_structurally_equal() {
        let config = IndexConfiguration::from_yaml(SAMPLE).unwrap();
        let emitted = config.to_yaml().unwrap();
        let reparsed = IndexConfiguration::from_yaml(&emitted).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_stopword_list() {
        let list: StopwordList = serde_yaml::from_str("stopwords: [a, the, of]").unwrap();
        assert_eq!(list.stopwords, vec!["a", "the", "of"]);
    }
}
