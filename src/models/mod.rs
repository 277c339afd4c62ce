mod query;
mod result;

pub use query::{RawQuery, StructuredQuery};
pub use result::SearchResult;

/// Identifier of a disjoint partition of the document corpus
pub type ShardId = u32;
