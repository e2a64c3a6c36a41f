//! Secondary evidence-quality signal, used to break near-ties in duels.

use std::collections::HashSet;

use crate::types::AggregatedResultSet;

const DIVERSITY_WEIGHT: f64 = 0.6;
const AUTHORITY_WEIGHT: f64 = 0.4;

/// Blend of host diversity (distinct hosts / results) and authority share
/// (results hosted on, or under, an authority domain). 0.0..=1.0; results
/// without a parseable URL, placeholders included, only dilute the score.
pub fn quality_signal(results: &AggregatedResultSet, authority_sites: &[String]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total = results.len() as f64;

    let hosts: Vec<String> = results.iter().filter_map(|r| r.host()).collect();
    let distinct = hosts.iter().collect::<HashSet<_>>().len() as f64;
    let authority = hosts
        .iter()
        .filter(|host| is_authority(host, authority_sites))
        .count() as f64;

    DIVERSITY_WEIGHT * (distinct / total) + AUTHORITY_WEIGHT * (authority / total)
}

fn is_authority(host: &str, authority_sites: &[String]) -> bool {
    authority_sites.iter().any(|site| {
        let site = site.to_lowercase();
        host == site || host.ends_with(&format!(".{site}"))
    })
}
