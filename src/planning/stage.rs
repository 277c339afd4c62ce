use std::collections::{HashMap, HashSet};

use rust_stemmers::{Algorithm, Stemmer};

use crate::error::{Result, ShoalError};

/// Per-stage configuration submap. A stage that was given no configuration
/// receives an empty map.
pub type StageConfig = serde_json::Map<String, serde_json::Value>;

/// A single named transform in a query planning pipeline.
///
/// Stages are pure: the same input and configuration always produce the
/// same output, and stages hold no mutable state. Later stages consume the
/// space-joined token output of earlier ones.
pub trait QueryStage: Send + Sync {
    fn apply(&self, query: &str, config: &StageConfig) -> Result<String>;
}

/// Unicode-aware case folding
pub struct LowercaseStage;

impl QueryStage for LowercaseStage {
    fn apply(&self, query: &str, _config: &StageConfig) -> Result<String> {
        Ok(query.to_lowercase())
    }
}

/// Whitespace tokenization; emits tokens re-joined with single spaces
pub struct TokenizeStage;

impl QueryStage for TokenizeStage {
    fn apply(&self, query: &str, _config: &StageConfig) -> Result<String> {
        Ok(query.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Removes exact matches against a configured stopword set.
///
/// The set comes from the `stopwords` config key (list of strings); setting
/// `use_default_list: true` merges in the English list from the
/// `stop-words` crate. With neither, the stage is the identity.
pub struct RemoveStopwordsStage;

impl RemoveStopwordsStage {
    fn stopword_set(config: &StageConfig) -> Result<HashSet<String>> {
        let mut set = HashSet::new();

        if let Some(value) = config.get("stopwords") {
            let list = value.as_array().ok_or_else(|| {
                ShoalError::Config("stopwords config must be a list of strings".to_string())
            })?;
            for entry in list {
                let word = entry.as_str().ok_or_else(|| {
                    ShoalError::Config("stopwords config must be a list of strings".to_string())
                })?;
                set.insert(word.to_string());
            }
        }

        if config.get("use_default_list").and_then(|v| v.as_bool()) == Some(true) {
            set.extend(stop_words::get(stop_words::LANGUAGE::English));
        }

        Ok(set)
    }
}

impl QueryStage for RemoveStopwordsStage {
    fn apply(&self, query: &str, config: &StageConfig) -> Result<String> {
        if query.is_empty() {
            return Ok(String::new());
        }
        let stopwords = Self::stopword_set(config)?;
        if stopwords.is_empty() {
            return Ok(query.to_string());
        }
        let kept: Vec<&str> = query
            .split_whitespace()
            .filter(|token| !stopwords.contains(*token))
            .collect();
        Ok(kept.join(" "))
    }
}

/// Appends configured synonym expansions to the token stream.
///
/// Expansions come from the `synonyms` config key: a map from term to a
/// list of replacement terms. A term whose expansions are already present
/// in the stream is not expanded again, so the stage is idempotent.
pub struct SynonymExpansionStage;

impl SynonymExpansionStage {
    fn synonym_map(config: &StageConfig) -> Result<HashMap<String, Vec<String>>> {
        let Some(value) = config.get("synonyms") else {
            return Ok(HashMap::new());
        };
        let object = value.as_object().ok_or_else(|| {
            ShoalError::Config("synonyms config must be a map of term to term list".to_string())
        })?;
        let mut map = HashMap::new();
        for (term, expansions) in object {
            let list = expansions.as_array().ok_or_else(|| {
                ShoalError::Config("synonyms config must be a map of term to term list".to_string())
            })?;
            let mut terms = Vec::with_capacity(list.len());
            for entry in list {
                let term = entry.as_str().ok_or_else(|| {
                    ShoalError::Config(
                        "synonyms config must be a map of term to term list".to_string(),
                    )
                })?;
                terms.push(term.to_string());
            }
            map.insert(term.clone(), terms);
        }
        Ok(map)
    }
}

impl QueryStage for SynonymExpansionStage {
    fn apply(&self, query: &str, config: &StageConfig) -> Result<String> {
        let synonyms = Self::synonym_map(config)?;
        if synonyms.is_empty() || query.is_empty() {
            return Ok(query.to_string());
        }

        let tokens: Vec<&str> = query.split_whitespace().collect();
        let mut present: HashSet<&str> = tokens.iter().copied().collect();
        let mut output: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();

        for token in &tokens {
            if let Some(expansions) = synonyms.get(*token) {
                for expansion in expansions {
                    if present.insert(expansion.as_str()) {
                        output.push(expansion.clone());
                    }
                }
            }
        }

        Ok(output.join(" "))
    }
}

/// Snowball stemming over each token
pub struct StemStage;

impl QueryStage for StemStage {
    fn apply(&self, query: &str, _config: &StageConfig) -> Result<String> {
        let stemmer = Stemmer::create(Algorithm::English);
        let stemmed: Vec<String> = query
            .split_whitespace()
            .map(|token| stemmer.stem(token).to_string())
            .collect();
        Ok(stemmed.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> StageConfig {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_lowercase_is_unicode_aware() {
        let out = LowercaseStage.apply("Grüße From BERLIN", &StageConfig::new()).unwrap();
        assert_eq!(out, "grüße from berlin");
    }

    #[test]
    fn test_tokenize_collapses_whitespace() {
        let out = TokenizeStage.apply("  hello   world\tagain ", &StageConfig::new()).unwrap();
        assert_eq!(out, "hello world again");
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert_eq!(TokenizeStage.apply("", &StageConfig::new()).unwrap(), "");
    }

    #[test]
    fn test_stopwords_exact_match_only() {
        let cfg = config(json!({"stopwords": ["the", "a"]}));
        let out = RemoveStopwordsStage.apply("the theater a cat", &cfg).unwrap();
        assert_eq!(out, "theater cat");
    }

    #[test]
    fn test_stopwords_identity_without_config() {
        let out = RemoveStopwordsStage
            .apply("the quick fox", &StageConfig::new())
            .unwrap();
        assert_eq!(out, "the quick fox");
    }

    #[test]
    fn test_stopwords_bad_config_rejected() {
        let cfg = config(json!({"stopwords": "the"}));
        assert!(RemoveStopwordsStage.apply("x", &cfg).is_err());
    }

    #[test]
    fn test_default_stopword_list() {
        let cfg = config(json!({"use_default_list": true}));
        let out = RemoveStopwordsStage.apply("the search engine", &cfg).unwrap();
        assert!(!out.contains("the"));
        assert!(out.contains("search"));
    }

    #[test]
    fn test_synonyms_appended() {
        let cfg = config(json!({"synonyms": {"pc": ["personal", "computer"]}}));
        let out = SynonymExpansionStage.apply("cheap pc", &cfg).unwrap();
        assert_eq!(out, "cheap pc personal computer");
    }

    #[test]
    fn test_synonym_expansion_is_idempotent() {
        let cfg = config(json!({"synonyms": {"pc": ["personal", "computer"]}}));
        let once = SynonymExpansionStage.apply("cheap pc", &cfg).unwrap();
        let twice = SynonymExpansionStage.apply(&once, &cfg).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stem_stage() {
        let out = StemStage.apply("running searches", &StageConfig::new()).unwrap();
        assert_eq!(out, "run search");
    }
}
