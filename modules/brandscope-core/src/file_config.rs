use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::duel::DuelConfig;
use crate::scoring::curve::DiscriminantCurve;
use crate::scoring::FallbackScores;

/// TOML-backed tuning loaded from disk. Secrets (API keys) stay as env vars.
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub disambiguation: DisambiguationConfig,
    pub duel: DuelConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub language: String,
    pub region: String,
    pub max_results_per_query: u32,
    /// Upper bound on the aggregated result set.
    pub result_cap: usize,
    pub query_timeout_ms: u64,
    /// Pause between successive queries of one plan.
    pub inter_query_delay_ms: u64,
    /// Synthetic results substituted when quota runs out before any real hit.
    pub placeholder_count: usize,
    pub social_exclusions: Vec<String>,
    pub authority_sites: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            region: "us".to_string(),
            max_results_per_query: 10,
            result_cap: 30,
            query_timeout_ms: 10_000,
            inter_query_delay_ms: 150,
            placeholder_count: 3,
            social_exclusions: [
                "facebook.com",
                "instagram.com",
                "tiktok.com",
                "pinterest.com",
                "x.com",
            ]
            .map(String::from)
            .to_vec(),
            authority_sites: [
                "wikipedia.org",
                "linkedin.com",
                "reuters.com",
                "bloomberg.com",
                "apnews.com",
                "forbes.com",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl SearchConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn inter_query_delay(&self) -> Duration {
        Duration::from_millis(self.inter_query_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub timeout_ms: u64,
    /// Snippets longer than this are cut before prompting.
    pub max_snippet_bytes: usize,
    pub curve: DiscriminantCurve,
    pub fallback: FallbackScores,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 45_000,
            max_snippet_bytes: 300,
            curve: DiscriminantCurve::default(),
            fallback: FallbackScores::default(),
        }
    }
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisambiguationConfig {
    /// Below this many results the stage is skipped.
    pub min_results: usize,
    pub timeout_ms: u64,
}

impl Default for DisambiguationConfig {
    fn default() -> Self {
        Self {
            min_results: 3,
            timeout_ms: 30_000,
        }
    }
}

impl DisambiguationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// How many leading results are folded into a cache key.
    pub key_result_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            key_result_limit: 30,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.search.result_cap, 30);
        assert_eq!(config.disambiguation.min_results, 3);
        assert_eq!(config.duel.tie_threshold, 3);
        assert_eq!(config.scoring.curve, DiscriminantCurve::default());
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = parse_config(
            r#"
            [search]
            result_cap = 12
            inter_query_delay_ms = 0

            [scoring.curve]
            band_low = 65
            band_high = 80
            push = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.search.result_cap, 12);
        assert_eq!(config.search.inter_query_delay(), Duration::ZERO);
        assert_eq!(config.search.max_results_per_query, 10);
        assert_eq!(config.scoring.curve.band_low, 65);
        assert_eq!(config.scoring.fallback, FallbackScores::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("[search]\nresults_cap = 5\n").is_err());
    }

    #[test]
    fn shipped_sample_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/brandscope.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.search.result_cap, 30);
    }
}
