use thiserror::Error;

use crate::models::ShardId;

/// Main error type for shoal operations
#[derive(Error, Debug)]
pub enum ShoalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage '{stage}' failed in pipeline '{pipeline}': {source}")]
    Stage {
        pipeline: String,
        stage: String,
        #[source]
        source: Box<ShoalError>,
    },

    #[error("Expression error in computed field '{field}': {message}")]
    Expression { field: String, message: String },

    #[error("No shards available to serve the query")]
    NoShards,

    #[error("All {attempted} dispatched searchers failed; first error: {first_error}")]
    AllShardsFailed {
        attempted: usize,
        first_error: String,
    },

    #[error("Searcher for shard {shard} failed: {message}")]
    SearcherFailed { shard: ShardId, message: String },

    #[error("Index is locked by another commit (lock file {lock_path})")]
    IndexLocked { lock_path: String },

    #[error("Segment path {0} does not exist")]
    PathMissing(String),

    #[error("Segment path {0} is not a directory")]
    NotDirectory(String),

    #[error("Upload of {key} failed after {attempts} attempts: {message}")]
    UploadFailed {
        key: String,
        attempts: usize,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index engine error: {0}")]
    Engine(String),
}

/// Result type alias for shoal operations
pub type Result<T> = std::result::Result<T, ShoalError>;

impl ShoalError {
    /// Wrap an error with the pipeline and stage that raised it
    pub fn in_stage(self, pipeline: &str, stage: &str) -> Self {
        ShoalError::Stage {
            pipeline: pipeline.to_string(),
            stage: stage.to_string(),
            source: Box::new(self),
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ShoalError::UploadFailed { .. } | ShoalError::SearcherFailed { .. } | ShoalError::Io(_)
        )
    }

    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            ShoalError::InvalidInput(_) => 400,
            ShoalError::IndexLocked { .. } => 409,
            ShoalError::Cancelled => 499,
            _ => 500,
        }
    }
}

impl From<tantivy::TantivyError> for ShoalError {
    fn from(e: tantivy::TantivyError) -> Self {
        ShoalError::Engine(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShoalError::PathMissing("/tmp/idx".to_string());
        assert_eq!(err.to_string(), "Segment path /tmp/idx does not exist");
    }

    #[test]
    fn test_stage_wrapping_keeps_context() {
        let err = ShoalError::InvalidInput("bad token".to_string())
            .in_stage("default_pipeline", "tokenize");
        let text = err.to_string();
        assert!(text.contains("default_pipeline"));
        assert!(text.contains("tokenize"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ShoalError::InvalidInput("q".into()).status_code(), 400);
        assert_eq!(
            ShoalError::IndexLocked {
                lock_path: "x".into()
            }
            .status_code(),
            409
        );
        assert_eq!(ShoalError::Cancelled.status_code(), 499);
        assert_eq!(ShoalError::NoShards.status_code(), 500);
    }

    #[test]
    fn test_retriable_errors() {
        assert!(ShoalError::Io(std::io::Error::other("disk")).is_retriable());
        assert!(!ShoalError::NoShards.is_retriable());
    }
}
