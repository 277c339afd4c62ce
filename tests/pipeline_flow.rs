//! Query understanding pipeline properties across the full stage set.

use std::sync::Arc;

use serde_json::json;

use shoal::config::IndexConfiguration;
use shoal::error::ShoalError;
use shoal::models::RawQuery;
use shoal::planning::{QueryPlanner, StageRegistry};

const CONFIG: &str = r#"
indexSchemas:
  - name: documents
    fields:
      - name: title
        type: text
queryPlanningPipelines:
  - name: default_pipeline
    steps: [lowercase, tokenize, remove_stopwords, synonym_expansion]
  - name: stemming
    steps: [lowercase, tokenize, stem]
  - name: disabled_pipeline
    steps: [lowercase]
    enabled: false
"#;

fn planner() -> QueryPlanner {
    let config = IndexConfiguration::from_yaml(CONFIG).unwrap();
    QueryPlanner::new(Arc::new(StageRegistry::with_builtin_stages()), config)
        .unwrap()
        .with_stopwords(&["the".to_string(), "a".to_string()])
        .with_stage_config(
            "synonym_expansion",
            json!({"synonyms": {"laptop": ["notebook"]}})
                .as_object()
                .unwrap()
                .clone(),
        )
}

#[test]
fn full_pipeline_lowercases_tokenizes_filters_and_expands() {
    let query = planner()
        .process(&RawQuery::from("The  Cheap LAPTOP"), "default_pipeline")
        .unwrap();
    assert_eq!(query.keywords, vec!["cheap", "laptop", "notebook"]);
}

#[test]
fn lowercase_pipelines_never_emit_uppercase() {
    let planner = planner();
    for raw in ["PIZZA", "MiXeD Case", "ÜBER Straße", "a The THE"] {
        let Ok(query) = planner.process(&RawQuery::from(raw), "default_pipeline") else {
            continue;
        };
        for keyword in &query.keywords {
            assert!(
                !keyword.chars().any(char::is_uppercase),
                "keyword {keyword:?} from {raw:?} contains uppercase"
            );
        }
    }
}

#[test]
fn stopword_only_query_yields_no_keywords() {
    let query = planner()
        .process(&RawQuery::from("the a THE"), "default_pipeline")
        .unwrap();
    assert!(query.keywords.is_empty());
}

#[test]
fn stemming_pipeline_reduces_word_forms() {
    let query = planner()
        .process(&RawQuery::from("Searching Searches"), "stemming")
        .unwrap();
    assert_eq!(query.keywords, vec!["search", "search"]);
}

#[test]
fn disabled_pipeline_is_not_executable() {
    let err = planner()
        .process(&RawQuery::from("q"), "disabled_pipeline")
        .unwrap_err();
    assert!(matches!(err, ShoalError::Config(_)));
}

#[test]
fn unknown_pipeline_is_a_config_error() {
    let err = planner()
        .process(&RawQuery::from("q"), "nope")
        .unwrap_err();
    assert!(matches!(err, ShoalError::Config(_)));
}

#[test]
fn empty_query_is_invalid_input() {
    let err = planner()
        .process(&RawQuery::from("   "), "default_pipeline")
        .unwrap_err();
    assert!(matches!(err, ShoalError::InvalidInput(_)));
}

#[test]
fn synonym_expansion_is_idempotent_end_to_end() {
    let planner = planner();
    let once = planner
        .run_pipeline("default_pipeline", "cheap laptop")
        .unwrap();
    let twice = planner.run_pipeline("default_pipeline", &once).unwrap();
    assert_eq!(once, twice);
}
