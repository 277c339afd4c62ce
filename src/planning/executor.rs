use std::collections::HashMap;
use std::sync::Arc;

use crate::config::IndexConfiguration;
use crate::error::{Result, ShoalError};
use crate::models::{RawQuery, StructuredQuery};
use crate::planning::registry::StageRegistry;
use crate::planning::stage::StageConfig;

/// Executes query planning pipelines against the stage registry.
///
/// Construction validates that every step of every enabled pipeline
/// resolves to a registered stage, so an unknown stage name is caught at
/// startup rather than on the first query that hits it.
pub struct QueryPlanner {
    registry: Arc<StageRegistry>,
    config: IndexConfiguration,
    stage_configs: HashMap<String, StageConfig>,
}

impl QueryPlanner {
    pub fn new(registry: Arc<StageRegistry>, config: IndexConfiguration) -> Result<Self> {
        for pipeline in &config.query_planning_pipelines {
            if !pipeline.enabled {
                continue;
            }
            for step in &pipeline.steps {
                if !registry.contains(step) {
                    return Err(ShoalError::Config(format!(
                        "query stage '{}' referenced by pipeline '{}' is not registered",
                        step, pipeline.name
                    )));
                }
            }
        }
        Ok(Self {
            registry,
            config,
            stage_configs: HashMap::new(),
        })
    }

    /// Attach a configuration submap for one stage
    pub fn with_stage_config(mut self, stage: &str, config: StageConfig) -> Self {
        self.stage_configs.insert(stage.to_string(), config);
        self
    }

    /// Convenience: wire a stopword list into the `remove_stopwords` stage
    pub fn with_stopwords(self, words: &[String]) -> Self {
        let mut config = StageConfig::new();
        config.insert(
            "stopwords".to_string(),
            serde_json::Value::Array(
                words
                    .iter()
                    .map(|w| serde_json::Value::String(w.clone()))
                    .collect(),
            ),
        );
        self.with_stage_config("remove_stopwords", config)
    }

    /// Process a raw query through the named pipeline into a structured one
    pub fn process(&self, raw: &RawQuery, pipeline_name: &str) -> Result<StructuredQuery> {
        if raw.is_empty() {
            return Err(ShoalError::InvalidInput("query must not be empty".to_string()));
        }
        let transformed = self.run_pipeline(pipeline_name, raw.as_str())?;
        let keywords = transformed
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(StructuredQuery::from_keywords(keywords))
    }

    /// Apply the pipeline's stages in declared order, threading the string
    pub fn run_pipeline(&self, pipeline_name: &str, raw: &str) -> Result<String> {
        let pipeline = self.config.pipeline(pipeline_name).ok_or_else(|| {
            ShoalError::Config(format!(
                "query planning pipeline '{pipeline_name}' not found in configuration"
            ))
        })?;
        if !pipeline.enabled {
            return Err(ShoalError::Config(format!(
                "query planning pipeline '{pipeline_name}' is disabled"
            )));
        }

        let empty = StageConfig::new();
        let mut current = raw.to_string();
        for step in &pipeline.steps {
            let stage = self.registry.get(step).ok_or_else(|| {
                ShoalError::Config(format!(
                    "query stage '{step}' not found in registry for pipeline '{pipeline_name}'"
                ))
            })?;
            let stage_config = self.stage_configs.get(step).unwrap_or(&empty);
            current = stage
                .apply(&current, stage_config)
                .map_err(|e| e.in_stage(pipeline_name, step))?;
        }
        Ok(current)
    }
}
