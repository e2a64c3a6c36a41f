//! Detects when one name's results describe several real-world entities.
//!
//! A single grouping call per result set, memoized like scoring. Sparse
//! result sets are never sent: below the configured minimum the answer is
//! always `Unambiguous`. The stage fails open: an evaluator failure is
//! logged and treated as unambiguous rather than blocking the analysis.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EvaluationError, PipelineError};
use crate::file_config::FileConfig;
use crate::memo::MemoCache;
use crate::scoring::prompts::{grouping_prompt, GROUPING_SYSTEM};
use crate::traits::{bounded, complete_structured, StructuredLlm};
use crate::types::{
    AggregatedResultSet, Disambiguation, EntityName, IdentityCandidate, SearchResult,
};

const IDENTITY_FUNCTION: &str = "identity_v1";

/// Words too generic to tell two candidates apart.
const FILLER_WORDS: &[&str] = &["the", "and", "for", "with", "from", "of"];

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct EntityGrouping {
    /// True only when two or more distinct entities are clearly present.
    ambiguous: bool,
    /// One entry per distinct entity; empty when not ambiguous.
    candidates: Vec<IdentityCandidate>,
}

impl EntityGrouping {
    fn into_disambiguation(self) -> Disambiguation {
        let mut seen = HashSet::new();
        let candidates: Vec<IdentityCandidate> = self
            .candidates
            .into_iter()
            .map(|c| IdentityCandidate {
                name: c.name.trim().to_string(),
                rationale: c.rationale.trim().to_string(),
            })
            .filter(|c| !c.name.is_empty() && seen.insert(c.name.to_lowercase()))
            .collect();

        if self.ambiguous && candidates.len() >= 2 {
            Disambiguation::Ambiguous { candidates }
        } else {
            Disambiguation::Unambiguous
        }
    }
}

#[derive(Serialize)]
struct IdentityKey {
    entity: String,
    results: Vec<String>,
}

pub struct IdentityDisambiguator {
    llm: Arc<dyn StructuredLlm>,
    cache: Arc<MemoCache<Disambiguation, EvaluationError>>,
    min_results: usize,
    timeout: Duration,
    max_snippet_bytes: usize,
    ttl: Duration,
    key_result_limit: usize,
}

impl IdentityDisambiguator {
    pub fn new(
        llm: Arc<dyn StructuredLlm>,
        cache: Arc<MemoCache<Disambiguation, EvaluationError>>,
        config: &FileConfig,
    ) -> Self {
        Self {
            llm,
            cache,
            min_results: config.disambiguation.min_results,
            timeout: config.disambiguation.timeout(),
            max_snippet_bytes: config.scoring.max_snippet_bytes,
            ttl: config.cache.ttl(),
            key_result_limit: config.cache.key_result_limit,
        }
    }

    pub async fn disambiguate(
        &self,
        results: &AggregatedResultSet,
        entity: &EntityName,
        cancel: &CancellationToken,
    ) -> Result<Disambiguation, PipelineError> {
        if results.len() < self.min_results {
            debug!(
                entity = %entity,
                results = results.len(),
                min_results = self.min_results,
                "Too few results to disambiguate"
            );
            return Ok(Disambiguation::Unambiguous);
        }

        let key = IdentityKey {
            entity: entity.as_str().to_lowercase(),
            results: results
                .iter()
                .take(self.key_result_limit)
                .map(SearchResult::key_text)
                .collect(),
        };
        let user_prompt = grouping_prompt(entity, results, self.max_snippet_bytes);

        loop {
            let llm = self.llm.clone();
            let user_prompt = user_prompt.clone();
            let timeout = self.timeout;
            let token = cancel.clone();

            let memoized = self
                .cache
                .memo(IDENTITY_FUNCTION, &key)
                .ttl(self.ttl)
                .get_or(move || async move {
                    let grouping: EntityGrouping = bounded(
                        &token,
                        timeout,
                        complete_structured(llm.as_ref(), GROUPING_SYSTEM, &user_prompt),
                    )
                    .await?;
                    Ok::<_, EvaluationError>(grouping.into_disambiguation())
                });

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                outcome = memoized => outcome,
            };

            match outcome {
                Ok(cached) => {
                    if let Disambiguation::Ambiguous { candidates } = &cached.value {
                        info!(entity = %entity, candidates = candidates.len(), "Results describe several entities");
                    }
                    return Ok(cached.value);
                }
                Err(e) if e.is_cancelled() => {
                    if cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled);
                    }
                    debug!(entity = %entity, "Shared grouping call was cancelled, retrying");
                }
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Disambiguation failed, continuing unambiguous");
                    return Ok(Disambiguation::Unambiguous);
                }
            }
        }
    }
}

/// Results that textually match `candidate`.
///
/// Matching uses the words of the candidate name that are not part of the
/// entity name itself ("hardware", "retailer" for "Acme (hardware
/// retailer)"), so results that mention only the shared name are dropped.
/// A candidate that adds no such words matches on its full name. Matching is
/// by whole word, so "band" does not match "bandwidth".
pub fn filter_for_candidate(
    results: &AggregatedResultSet,
    entity: &EntityName,
    candidate: &str,
) -> AggregatedResultSet {
    let entity_words: HashSet<String> = words(entity.as_str()).collect();
    let distinguishing: Vec<String> = words(candidate)
        .filter(|w| w.chars().count() >= 3)
        .filter(|w| !entity_words.contains(w) && !FILLER_WORDS.contains(&w.as_str()))
        .collect();
    let full_name: Vec<String> = words(candidate).collect();

    let kept = results
        .iter()
        .filter(|r| {
            let text: Vec<String> = words(&r.searchable_text()).collect();
            if !distinguishing.is_empty() {
                distinguishing.iter().any(|w| text.contains(w))
            } else if full_name.is_empty() {
                true
            } else {
                text.windows(full_name.len()).any(|window| window == full_name.as_slice())
            }
        })
        .cloned()
        .collect();

    AggregatedResultSet::from_deduplicated(kept)
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}
