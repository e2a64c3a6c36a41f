//! Query fan-out for one entity.
//!
//! A handful of variants widens recall without burning through the search
//! provider's rate budget:
//!
//! 1. exact phrase (highest precision, always first)
//! 2. exact phrase minus high-noise social domains
//! 3. exact phrase restricted to press / encyclopedic / professional sites
//! 4. exact phrase plus an entity-type hint, when the caller knows the category

use crate::file_config::SearchConfig;
use crate::types::{EntityCategory, EntityName, QueryPlan};

#[derive(Debug, Clone)]
pub struct QueryPlanner {
    social_exclusions: Vec<String>,
    authority_sites: Vec<String>,
}

impl QueryPlanner {
    pub fn new(social_exclusions: Vec<String>, authority_sites: Vec<String>) -> Self {
        Self {
            social_exclusions,
            authority_sites,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.social_exclusions.clone(),
            config.authority_sites.clone(),
        )
    }

    /// Build the ordered query plan. Deterministic, no I/O.
    pub fn plan(&self, entity: &EntityName, category: Option<EntityCategory>) -> QueryPlan {
        let phrase = format!("\"{}\"", entity.as_str());
        let mut variants = vec![phrase.clone()];

        if !self.social_exclusions.is_empty() {
            let exclusions = self
                .social_exclusions
                .iter()
                .map(|domain| format!("-site:{domain}"))
                .collect::<Vec<_>>()
                .join(" ");
            variants.push(format!("{phrase} {exclusions}"));
        }

        if !self.authority_sites.is_empty() {
            let sites = self
                .authority_sites
                .iter()
                .map(|domain| format!("site:{domain}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            variants.push(format!("{phrase} ({sites})"));
        }

        if let Some(category) = category {
            variants.push(format!("{phrase} {}", category.hint()));
        }

        QueryPlan::from_variants(variants)
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}
