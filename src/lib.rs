pub mod api;
pub mod broker;
pub mod config;
pub mod error;
pub mod indexer;
pub mod metrics;
pub mod models;
pub mod planning;
pub mod searcher;
pub mod storage;
pub mod testing;

pub use broker::Broker;
pub use config::IndexConfiguration;
pub use error::{Result, ShoalError};
pub use indexer::Indexer;
pub use metrics::ServiceMetrics;
pub use models::{RawQuery, SearchResult, ShardId, StructuredQuery};
pub use planning::QueryPlanner;
pub use searcher::LocalSearcher;
pub use storage::SegmentStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
