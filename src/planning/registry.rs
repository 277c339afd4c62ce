use std::collections::HashMap;

use crate::error::{Result, ShoalError};
use crate::planning::stage::{
    LowercaseStage, QueryStage, RemoveStopwordsStage, StemStage, SynonymExpansionStage,
    TokenizeStage,
};

/// Maps stage names to their implementations.
///
/// The registry is populated during startup and then handed to the planner
/// behind an `Arc`; after that point it is only ever read, so lookups take
/// no lock. Registering a name twice fails fast.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<String, Box<dyn QueryStage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with every built-in stage
    pub fn with_builtin_stages() -> Self {
        let mut registry = Self::new();
        // Names here are the ones pipeline configurations refer to.
        registry
            .register("lowercase", Box::new(LowercaseStage))
            .expect("empty registry");
        registry
            .register("tokenize", Box::new(TokenizeStage))
            .expect("empty registry");
        registry
            .register("remove_stopwords", Box::new(RemoveStopwordsStage))
            .expect("empty registry");
        registry
            .register("synonym_expansion", Box::new(SynonymExpansionStage))
            .expect("empty registry");
        registry
            .register("stem", Box::new(StemStage))
            .expect("empty registry");
        registry
    }

    /// Add a stage under a name; duplicate names are a configuration error
    pub fn register(&mut self, name: &str, stage: Box<dyn QueryStage>) -> Result<()> {
        if self.stages.contains_key(name) {
            return Err(ShoalError::Config(format!(
                "query stage '{name}' is already registered"
            )));
        }
        self.stages.insert(name.to_string(), stage);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn QueryStage> {
        self.stages.get(name).map(Box::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }
}
