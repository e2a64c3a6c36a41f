//! Scoring engine: one schema-constrained evaluation per entity, producing
//! three independent scores plus narrative, memoized per content key.
//!
//! Out-of-range scores and blank rationales are validation failures. Every
//! failure (provider, timeout, malformed output, validation) ends in the
//! neutral fallback report, flagged as such and never cached.

pub mod curve;
pub(crate) mod prompts;

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EvaluationError, PipelineError, ValidationError};
use crate::file_config::{CacheConfig, ScoringConfig};
use crate::memo::MemoCache;
use crate::traits::{bounded, complete_structured, StructuredLlm};
use crate::types::{
    AggregatedResultSet, EntityName, Narrative, ScoreReport, ScoreTriple, SearchResult,
    SentimentLabel,
};

use self::curve::DiscriminantCurve;
use self::prompts::{scoring_prompt, SCORING_SYSTEM};

const SCORE_FUNCTION: &str = "score_v1";

/// Structured answer requested from the evaluator.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ScoringResponse {
    /// Digital presence, integer 0-100.
    presence: i64,
    /// Why the presence score, citing the evidence.
    presence_rationale: String,
    /// Public sentiment, integer 0-100.
    sentiment: i64,
    /// Why the sentiment score, citing the evidence.
    sentiment_rationale: String,
    sentiment_label: SentimentLabel,
    /// Message coherence, integer 0-100.
    coherence: i64,
    /// Why the coherence score, citing the evidence.
    coherence_rationale: String,
    /// Two or three sentence overview.
    summary: String,
}

impl ScoringResponse {
    fn into_report(self, curve: &DiscriminantCurve) -> Result<ScoreReport, ValidationError> {
        let presence = in_range("presence", self.presence)?;
        let sentiment = in_range("sentiment", self.sentiment)?;
        let coherence = in_range("coherence", self.coherence)?;

        let narrative = Narrative {
            summary: non_blank("summary", self.summary)?,
            presence_rationale: non_blank("presence_rationale", self.presence_rationale)?,
            sentiment_rationale: non_blank("sentiment_rationale", self.sentiment_rationale)?,
            coherence_rationale: non_blank("coherence_rationale", self.coherence_rationale)?,
        };

        Ok(ScoreReport {
            scores: ScoreTriple::new(
                curve.apply(presence),
                curve.apply(sentiment),
                curve.apply(coherence),
                self.sentiment_label,
            ),
            narrative,
            fallback: false,
            fallback_reason: None,
        })
    }
}

fn in_range(dimension: &'static str, value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(ValidationError::ScoreOutOfRange { dimension, value })
}

fn non_blank(field: &'static str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Neutral triple returned when evaluation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackScores {
    pub presence: u8,
    pub sentiment: u8,
    pub coherence: u8,
}

impl Default for FallbackScores {
    fn default() -> Self {
        Self {
            presence: 60,
            sentiment: 65,
            coherence: 70,
        }
    }
}

impl FallbackScores {
    pub fn report(&self, reason: impl Into<String>) -> ScoreReport {
        let not_evaluated = "Not evaluated: automated scoring was unavailable.".to_string();
        ScoreReport {
            scores: ScoreTriple::new(
                self.presence,
                self.sentiment,
                self.coherence,
                SentimentLabel::Neutral,
            ),
            narrative: Narrative {
                summary: "Automated evaluation was unavailable, neutral default scores are shown."
                    .to_string(),
                presence_rationale: not_evaluated.clone(),
                sentiment_rationale: not_evaluated.clone(),
                coherence_rationale: not_evaluated,
            },
            fallback: true,
            fallback_reason: Some(reason.into()),
        }
    }
}

/// What one scoring call evaluates.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub entity: &'a EntityName,
    /// Chosen candidate, when disambiguation narrowed the evidence.
    pub identity: Option<&'a str>,
    pub results: &'a AggregatedResultSet,
    pub message: Option<&'a str>,
    pub language: &'a str,
}

/// Semantically relevant subset of a scoring request, hashed into the memo
/// key. Snippets are left out so re-ranked copies of one result list still hit.
#[derive(Serialize)]
struct ScoreKey<'a> {
    entity: String,
    identity: Option<String>,
    results: Vec<String>,
    language: String,
    message: Option<&'a str>,
}

impl<'a> ScoreKey<'a> {
    fn new(request: &ScoringRequest<'a>, result_limit: usize) -> Self {
        Self {
            entity: request.entity.as_str().to_lowercase(),
            identity: request.identity.map(str::to_lowercase),
            results: request
                .results
                .iter()
                .take(result_limit)
                .map(SearchResult::key_text)
                .collect(),
            language: request.language.trim().to_lowercase(),
            message: request.message.map(str::trim).filter(|m| !m.is_empty()),
        }
    }
}

pub struct ScoringEngine {
    llm: Arc<dyn StructuredLlm>,
    cache: Arc<MemoCache<ScoreReport, EvaluationError>>,
    config: ScoringConfig,
    ttl: Duration,
    key_result_limit: usize,
}

impl ScoringEngine {
    pub fn new(
        llm: Arc<dyn StructuredLlm>,
        cache: Arc<MemoCache<ScoreReport, EvaluationError>>,
        config: &ScoringConfig,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            llm,
            cache,
            config: config.clone(),
            ttl: cache_config.ttl(),
            key_result_limit: cache_config.key_result_limit,
        }
    }

    /// Score one entity. Provider trouble never surfaces here: it yields the
    /// flagged fallback report. Only cancellation is an error.
    pub async fn score(
        &self,
        request: ScoringRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<ScoreReport, PipelineError> {
        let key = ScoreKey::new(&request, self.key_result_limit);
        let user_prompt = scoring_prompt(
            request.entity,
            request.identity,
            request.results,
            request.message,
            self.config.max_snippet_bytes,
        );

        loop {
            let llm = self.llm.clone();
            let user_prompt = user_prompt.clone();
            let curve = self.config.curve;
            let timeout = self.config.timeout();
            let token = cancel.clone();

            let memoized = self
                .cache
                .memo(SCORE_FUNCTION, &key)
                .ttl(self.ttl)
                .get_or(move || async move {
                    evaluate(llm, user_prompt, curve, timeout, token).await
                });

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                outcome = memoized => outcome,
            };

            match outcome {
                Ok(cached) => {
                    info!(
                        entity = %request.entity,
                        from_cache = cached.from_cache,
                        presence = cached.value.scores.presence,
                        sentiment = cached.value.scores.sentiment,
                        coherence = cached.value.scores.coherence,
                        "Scores ready"
                    );
                    return Ok(cached.value);
                }
                Err(e) if e.is_cancelled() => {
                    if cancel.is_cancelled() {
                        return Err(PipelineError::Cancelled);
                    }
                    // Joined a computation whose own caller gave up.
                    debug!(entity = %request.entity, "Shared scoring call was cancelled, retrying");
                }
                Err(e) => {
                    warn!(entity = %request.entity, error = %e, "Scoring failed, using fallback scores");
                    return Ok(self.config.fallback.report(e.to_string()));
                }
            }
        }
    }
}

async fn evaluate(
    llm: Arc<dyn StructuredLlm>,
    user_prompt: String,
    curve: DiscriminantCurve,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<ScoreReport, EvaluationError> {
    let response: ScoringResponse = bounded(
        &cancel,
        timeout,
        complete_structured(llm.as_ref(), SCORING_SYSTEM, &user_prompt),
    )
    .await?;
    Ok(response.into_report(&curve)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::error::ProviderError;
    use crate::testing::{result, scoring_json, MockLlm};
    use serde_json::json;

    fn engine(llm: Arc<MockLlm>) -> ScoringEngine {
        ScoringEngine::new(
            llm,
            Arc::new(MemoCache::new(Duration::from_secs(60))),
            &ScoringConfig::default(),
            &CacheConfig::default(),
        )
    }

    fn evidence() -> AggregatedResultSet {
        aggregate(
            [
                result("https://acme.com"),
                result("https://en.wikipedia.org/wiki/Acme"),
            ],
            30,
        )
    }

    fn request<'a>(entity: &'a EntityName, results: &'a AggregatedResultSet) -> ScoringRequest<'a> {
        ScoringRequest {
            entity,
            identity: None,
            results,
            message: Some("We build rockets"),
            language: "en",
        }
    }

    #[tokio::test]
    async fn genuine_scores_pass_through_the_curve() {
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", scoring_json(90, 77, 40)));
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();

        let report = engine(llm)
            .score(request(&entity, &results), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.fallback);
        assert_eq!(report.scores.presence, 90);
        assert_eq!(report.scores.sentiment, 72);
        assert_eq!(report.scores.coherence, 40);
        assert!(!report.narrative.summary.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_score_triggers_fallback() {
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", scoring_json(140, 50, 50)));
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();

        let report = engine(llm)
            .score(request(&entity, &results), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.fallback);
        assert_eq!(
            (report.scores.presence, report.scores.sentiment, report.scores.coherence),
            (60, 65, 70)
        );
        assert_eq!(report.scores.sentiment_label, SentimentLabel::Neutral);
        assert!(report.fallback_reason.unwrap().contains("presence score 140"));
    }

    #[tokio::test]
    async fn blank_rationale_is_a_validation_failure() {
        let mut body = scoring_json(50, 50, 50);
        body["coherence_rationale"] = json!("   ");
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", body));
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();

        let report = engine(llm)
            .score(request(&entity, &results), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.fallback);
        assert!(report.fallback_reason.unwrap().contains("coherence_rationale"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_and_is_not_cached() {
        let llm = Arc::new(
            MockLlm::new()
                .fail("ScoringResponse", ProviderError::QuotaExceeded)
                .respond("ScoringResponse", scoring_json(50, 50, 50)),
        );
        let engine = engine(llm.clone());
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();
        let cancel = CancellationToken::new();

        let first = engine.score(request(&entity, &results), &cancel).await.unwrap();
        let second = engine.score(request(&entity, &results), &cancel).await.unwrap();

        assert!(first.fallback);
        assert!(!second.fallback);
        assert_eq!(llm.calls("ScoringResponse"), 2);
    }

    #[tokio::test]
    async fn identical_requests_are_served_from_cache() {
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", scoring_json(50, 60, 90)));
        let engine = engine(llm.clone());
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();
        let cancel = CancellationToken::new();

        let first = engine.score(request(&entity, &results), &cancel).await.unwrap();
        let second = engine.score(request(&entity, &results), &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(llm.calls("ScoringResponse"), 1);
    }

    #[tokio::test]
    async fn different_claims_use_different_keys() {
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", scoring_json(50, 60, 90)));
        let engine = engine(llm.clone());
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();
        let cancel = CancellationToken::new();

        engine.score(request(&entity, &results), &cancel).await.unwrap();
        let mut other = request(&entity, &results);
        other.message = Some("We sell anvils");
        engine.score(other, &cancel).await.unwrap();

        assert_eq!(llm.calls("ScoringResponse"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_evaluator_times_out_into_fallback() {
        let llm = Arc::new(
            MockLlm::new()
                .respond("ScoringResponse", scoring_json(50, 50, 50))
                .with_latency(Duration::from_secs(120)),
        );
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();

        let report = engine(llm)
            .score(request(&entity, &results), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.fallback);
        assert_eq!(report.fallback_reason.as_deref(), Some("provider call timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_is_an_error_not_a_fallback() {
        let llm = Arc::new(MockLlm::new().respond("ScoringResponse", scoring_json(50, 50, 50)));
        let entity = EntityName::parse("Acme").unwrap();
        let results = evidence();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine(llm).score(request(&entity, &results), &cancel).await;
        assert_eq!(outcome, Err(PipelineError::Cancelled));
    }

    #[test]
    fn fallback_report_is_flagged() {
        let report = FallbackScores::default().report("search provider down");
        assert!(report.fallback);
        assert_eq!(report.fallback_reason.as_deref(), Some("search provider down"));
    }
}
