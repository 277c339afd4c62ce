use std::collections::HashSet;

use crate::models::SearchResult;

/// Concatenate per-searcher batches in arrival order and drop duplicate
/// ids, keeping the first occurrence. Returns the merged list and the
/// number of duplicates dropped.
///
/// No cross-shard re-ranking happens here: scores pass through untouched
/// and order is purely first-arrival.
pub fn merge_deduplicate(batches: Vec<Vec<SearchResult>>) -> (Vec<SearchResult>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    let mut dropped = 0usize;

    for batch in batches {
        for result in batch {
            if seen.insert(result.id.clone()) {
                merged.push(result);
            } else {
                dropped += 1;
            }
        }
    }

    (merged, dropped)
}
