//! The reputation analysis pipeline.
//!
//! ```text
//! plan → execute → aggregate → disambiguate ─┬→ score → EntityAnalysis
//!                                            └→ NeedsDisambiguation(ticket)
//!                                                   │ select_identity
//!                                                   └→ filter → score
//! ```
//!
//! Duels run two analyses concurrently (disambiguation skipped) and hand
//! both to the differentiator. Stages are injected at construction; the two
//! memo caches are the only shared mutable state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::disambiguator::{filter_for_candidate, IdentityDisambiguator};
use crate::duel::{self, DuelConfig};
use crate::error::{EvaluationError, PipelineError, PipelineResult};
use crate::executor::SearchExecutor;
use crate::file_config::{FileConfig, SearchConfig};
use crate::memo::MemoCache;
use crate::planner::QueryPlanner;
use crate::quality::quality_signal;
use crate::scoring::{ScoringEngine, ScoringRequest};
use crate::traits::{SearchProvider, StructuredLlm};
use crate::types::{
    AggregatedResultSet, AnalysisOutcome, AnalysisRequest, Disambiguation, DisambiguationTicket,
    DuelRequest, DuelResult, EntityAnalysis, EntityCategory, EntityName, IdentitySelection,
    ScoreReport, SearchOptions, SearchStats,
};

/// Memo caches for the two LLM-backed stages. Clone to share between
/// pipelines; construct fresh ones for isolation.
#[derive(Debug, Clone)]
pub struct PipelineCaches {
    pub scores: Arc<MemoCache<ScoreReport, EvaluationError>>,
    pub identities: Arc<MemoCache<Disambiguation, EvaluationError>>,
}

impl PipelineCaches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            scores: Arc::new(MemoCache::new(ttl)),
            identities: Arc::new(MemoCache::new(ttl)),
        }
    }

    /// Purge stale entries from both caches. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.scores.evict_expired() + self.identities.evict_expired()
    }
}

impl Default for PipelineCaches {
    fn default() -> Self {
        Self::new(crate::file_config::CacheConfig::default().ttl())
    }
}

/// Search evidence for one entity, ready to be scored.
struct Evidence {
    run_id: Uuid,
    entity: EntityName,
    message: Option<String>,
    language: String,
    results: AggregatedResultSet,
    search: SearchStats,
}

pub struct ReputationPipeline {
    planner: QueryPlanner,
    executor: SearchExecutor,
    disambiguator: IdentityDisambiguator,
    scoring: ScoringEngine,
    search: SearchConfig,
    duel: DuelConfig,
}

impl ReputationPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn StructuredLlm>,
        caches: PipelineCaches,
        config: &FileConfig,
    ) -> Self {
        Self {
            planner: QueryPlanner::from_config(&config.search),
            executor: SearchExecutor::new(search, &config.search),
            disambiguator: IdentityDisambiguator::new(llm.clone(), caches.identities, config),
            scoring: ScoringEngine::new(llm, caches.scores, &config.scoring, &config.cache),
            search: config.search.clone(),
            duel: config.duel,
        }
    }

    /// Analyze one entity. Halts with a ticket instead of guessing when the
    /// results describe more than one real-world entity.
    pub async fn analyze_entity(
        &self,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<AnalysisOutcome> {
        let entity = EntityName::parse(&request.name)?;
        let run_id = Uuid::new_v4();
        let span = info_span!("analyze", %run_id, entity = %entity);

        async move {
            let options = self.options(request.language.as_deref(), request.region.as_deref());
            let evidence = self
                .gather(run_id, entity, request.category, request.message, options.clone(), cancel)
                .await?;

            // Placeholders say nothing about identity.
            if !evidence.search.placeholders_used {
                let verdict = self
                    .disambiguator
                    .disambiguate(&evidence.results, &evidence.entity, cancel)
                    .await?;

                if let Disambiguation::Ambiguous { candidates } = verdict {
                    info!(candidates = candidates.len(), "Halting for identity selection");
                    return Ok(AnalysisOutcome::NeedsDisambiguation(DisambiguationTicket {
                        run_id,
                        entity: evidence.entity,
                        message: evidence.message,
                        language: options.language,
                        region: options.region,
                        results: evidence.results,
                        candidates,
                        search: evidence.search,
                    }));
                }
            }

            let analysis = self.score_evidence(evidence, None, cancel).await?;
            Ok(AnalysisOutcome::Scored(analysis))
        }
        .instrument(span)
        .await
    }

    /// Resume a halted analysis with the caller's choice. Re-enters at the
    /// scoring stage; no search is repeated.
    pub async fn select_identity(
        &self,
        ticket: DisambiguationTicket,
        selection: IdentitySelection,
        cancel: &CancellationToken,
    ) -> PipelineResult<EntityAnalysis> {
        let span = info_span!("analyze", run_id = %ticket.run_id, entity = %ticket.entity);

        async move {
            let (results, identity) = match selection {
                IdentitySelection::ContinueWithout => {
                    info!("Continuing without identity selection");
                    (ticket.results, None)
                }
                IdentitySelection::Candidate(name) => {
                    let wanted = name.trim().to_lowercase();
                    let candidate = ticket
                        .candidates
                        .iter()
                        .find(|c| c.name.trim().to_lowercase() == wanted)
                        .ok_or_else(|| PipelineError::UnknownCandidate(name.clone()))?;

                    let filtered = filter_for_candidate(&ticket.results, &ticket.entity, &candidate.name);
                    info!(
                        identity = %candidate.name,
                        kept = filtered.len(),
                        of = ticket.results.len(),
                        "Scoped results to selected identity"
                    );
                    if filtered.is_empty() {
                        warn!(identity = %candidate.name, "No result matches the selected identity, scoring the full set");
                        (ticket.results, Some(candidate.name.clone()))
                    } else {
                        (filtered, Some(candidate.name.clone()))
                    }
                }
            };

            let evidence = Evidence {
                run_id: ticket.run_id,
                entity: ticket.entity,
                message: ticket.message,
                language: ticket.language,
                results,
                search: ticket.search,
            };
            self.score_evidence(evidence, identity, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Compare two entities. Both sub-pipelines run concurrently and fall
    /// back independently; only cancellation stops the duel.
    pub async fn analyze_duel(
        &self,
        request: DuelRequest,
        cancel: &CancellationToken,
    ) -> PipelineResult<DuelResult> {
        let first = EntityName::parse(&request.first)?;
        let second = EntityName::parse(&request.second)?;
        let options = self.options(request.language.as_deref(), request.region.as_deref());

        let (a, b) = tokio::join!(
            self.analyze_for_duel(first, request.message.clone(), options.clone(), cancel),
            self.analyze_for_duel(second, request.message.clone(), options, cancel),
        );

        Ok(duel::resolve(a?, b?, &self.duel))
    }

    async fn analyze_for_duel(
        &self,
        entity: EntityName,
        message: Option<String>,
        options: SearchOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<EntityAnalysis> {
        let run_id = Uuid::new_v4();
        let span = info_span!("analyze", %run_id, entity = %entity);

        async move {
            let evidence = self.gather(run_id, entity, None, message, options, cancel).await?;
            self.score_evidence(evidence, None, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Plan, execute and aggregate.
    async fn gather(
        &self,
        run_id: Uuid,
        entity: EntityName,
        category: Option<EntityCategory>,
        message: Option<String>,
        options: SearchOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<Evidence> {
        let plan = self.planner.plan(&entity, category);
        info!(queries = plan.len(), language = %options.language, region = %options.region, "Starting analysis");

        let outcome = self.executor.execute(&plan, &options, cancel).await?;
        let results = aggregate(outcome.results, self.search.result_cap);
        info!(results = results.len(), "Results aggregated");

        Ok(Evidence {
            run_id,
            entity,
            message,
            language: options.language,
            results,
            search: outcome.stats,
        })
    }

    async fn score_evidence(
        &self,
        evidence: Evidence,
        identity: Option<String>,
        cancel: &CancellationToken,
    ) -> PipelineResult<EntityAnalysis> {
        let report = self
            .scoring
            .score(
                ScoringRequest {
                    entity: &evidence.entity,
                    identity: identity.as_deref(),
                    results: &evidence.results,
                    message: evidence.message.as_deref(),
                    language: &evidence.language,
                },
                cancel,
            )
            .await?;

        let quality = if evidence.search.placeholders_used {
            0.0
        } else {
            quality_signal(&evidence.results, &self.search.authority_sites)
        };

        let degradation_reasons = degradation_reasons(&evidence.search, &report);
        if !degradation_reasons.is_empty() {
            warn!(reasons = ?degradation_reasons, "Analysis degraded");
        }

        Ok(EntityAnalysis {
            run_id: evidence.run_id,
            entity: evidence.entity,
            identity,
            result_count: evidence.results.len(),
            report,
            search: evidence.search,
            quality_signal: quality,
            degraded: !degradation_reasons.is_empty(),
            degradation_reasons,
        })
    }

    fn options(&self, language: Option<&str>, region: Option<&str>) -> SearchOptions {
        SearchOptions {
            language: or_default(language, &self.search.language),
            region: or_default(region, &self.search.region),
            max_results_per_query: self.search.max_results_per_query,
        }
    }
}

fn or_default(value: Option<&str>, default: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_lowercase()
}

fn degradation_reasons(search: &SearchStats, report: &ScoreReport) -> Vec<String> {
    let mut reasons = Vec::new();
    if search.placeholders_used {
        reasons.push("search quota exhausted, placeholder results substituted".to_string());
    } else if search.quota_exhausted {
        reasons.push("search quota exhausted, results are partial".to_string());
    } else if search.queries_planned > 0 && search.queries_succeeded == 0 {
        reasons.push("no search query succeeded".to_string());
    }
    if report.fallback {
        let reason = report.fallback_reason.as_deref().unwrap_or("unknown error");
        reasons.push(format!("scoring fell back to neutral scores: {reason}"));
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::FallbackScores;

    #[test]
    fn clean_run_has_no_degradation() {
        let search = SearchStats {
            queries_planned: 3,
            queries_succeeded: 3,
            ..Default::default()
        };
        let mut report = FallbackScores::default().report("x");
        report.fallback = false;
        assert!(degradation_reasons(&search, &report).is_empty());
    }

    #[test]
    fn quota_and_fallback_are_both_reported() {
        let search = SearchStats {
            queries_planned: 3,
            quota_exhausted: true,
            placeholders_used: true,
            ..Default::default()
        };
        let report = FallbackScores::default().report("provider call timed out");
        let reasons = degradation_reasons(&search, &report);
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("placeholder"));
        assert!(reasons[1].contains("provider call timed out"));
    }

    #[test]
    fn all_failed_queries_count_as_degraded() {
        let search = SearchStats {
            queries_planned: 3,
            queries_failed: 2,
            queries_timed_out: 1,
            ..Default::default()
        };
        let mut report = FallbackScores::default().report("x");
        report.fallback = false;
        assert_eq!(degradation_reasons(&search, &report), ["no search query succeeded"]);
    }
}
