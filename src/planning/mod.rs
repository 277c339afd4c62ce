//! Query understanding and planning
//!
//! Raw query strings pass through a configurable pipeline of named stages
//! before the broker routes them. Stages are pure string transforms held in
//! a registry that is populated at startup and read-only afterwards.

pub mod executor;
pub mod expression;
pub mod registry;
pub mod stage;

pub use executor::QueryPlanner;
pub use expression::evaluate_computed_field;
pub use registry::StageRegistry;
pub use stage::{QueryStage, StageConfig};
