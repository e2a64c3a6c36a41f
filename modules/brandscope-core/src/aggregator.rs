use std::collections::HashSet;

use crate::types::{AggregatedResultSet, SearchResult};

/// Merge raw results: first occurrence per canonical URL wins, input order is
/// kept, and the output is truncated to `cap`.
///
/// Results without a usable URL have no identity key and are never treated
/// as duplicates of each other.
pub fn aggregate(raw: impl IntoIterator<Item = SearchResult>, cap: usize) -> AggregatedResultSet {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();

    for result in raw {
        if kept.len() >= cap {
            break;
        }
        match result.canonical_url() {
            Some(key) => {
                if seen.insert(key) {
                    kept.push(result);
                }
            }
            None => kept.push(result),
        }
    }

    AggregatedResultSet::from_deduplicated(kept)
}
