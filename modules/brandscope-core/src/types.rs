use std::collections::HashSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Name of the brand, person or organization under analysis.
///
/// Opaque identifier: only surrounding whitespace and double quotes are
/// removed, the latter so the name can sit inside a phrase query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityName(String);

impl EntityName {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let cleaned: String = raw.chars().filter(|c| *c != '"').collect();
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return Err(PipelineError::InvalidEntityName);
        }
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityName {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityName> for String {
    fn from(name: EntityName) -> Self {
        name.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Known kind of entity, used for the type-hint query variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Company,
    Person,
    Organization,
    Location,
}

impl EntityCategory {
    pub fn hint(&self) -> &'static str {
        match self {
            EntityCategory::Company => "company",
            EntityCategory::Person => "person",
            EntityCategory::Organization => "organization",
            EntityCategory::Location => "location",
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One organic search hit. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
            snippet: Some(snippet.into()),
        }
    }

    /// Identity key for deduplication: lowercased URL without trailing slash.
    /// `None` when the URL is missing or blank.
    pub fn canonical_url(&self) -> Option<String> {
        let lowered = self.url.as_deref()?.trim().to_lowercase();
        let canonical = lowered.trim_end_matches('/');
        if canonical.is_empty() {
            None
        } else {
            Some(canonical.to_string())
        }
    }

    /// What identifies this hit in a cache key: the canonical URL, else the
    /// lowercased title.
    pub fn key_text(&self) -> String {
        self.canonical_url()
            .or_else(|| self.title.as_deref().map(|t| t.trim().to_lowercase()))
            .unwrap_or_default()
    }

    /// Host without a leading `www.`.
    pub fn host(&self) -> Option<String> {
        let parsed = url::Url::parse(self.url.as_deref()?.trim()).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
    }

    /// Lowercased title, snippet and URL joined, for textual matching.
    pub fn searchable_text(&self) -> String {
        [&self.title, &self.snippet, &self.url]
            .iter()
            .filter_map(|field| field.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Per-request search locale and sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub language: String,
    pub region: String,
    pub max_results_per_query: u32,
}

/// Ordered, duplicate-free query strings for one entity. The exact-phrase
/// query always comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    queries: Vec<String>,
}

impl QueryPlan {
    pub(crate) fn from_variants(variants: impl IntoIterator<Item = String>) -> Self {
        let mut seen = HashSet::new();
        let queries = variants
            .into_iter()
            .filter(|q| seen.insert(q.clone()))
            .collect();
        Self { queries }
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Deduplicated, first-seen-ordered result list. No two entries share a
/// canonical URL. Built by [`crate::aggregator::aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SearchResult>", into = "Vec<SearchResult>")]
pub struct AggregatedResultSet {
    results: Vec<SearchResult>,
}

impl AggregatedResultSet {
    pub(crate) fn from_deduplicated(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    pub fn as_slice(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_inner(self) -> Vec<SearchResult> {
        self.results
    }
}

impl From<Vec<SearchResult>> for AggregatedResultSet {
    /// Re-establishes the dedup invariant for sets that crossed a serialization boundary.
    fn from(results: Vec<SearchResult>) -> Self {
        crate::aggregator::aggregate(results, usize::MAX)
    }
}

impl From<AggregatedResultSet> for Vec<SearchResult> {
    fn from(set: AggregatedResultSet) -> Self {
        set.results
    }
}

impl<'a> IntoIterator for &'a AggregatedResultSet {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// How the search phase went for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub queries_planned: usize,
    pub queries_succeeded: usize,
    pub queries_failed: usize,
    pub queries_timed_out: usize,
    /// Provider answered 429; the rest of the plan was skipped.
    pub quota_exhausted: bool,
    /// Synthetic results were substituted for an empty result list.
    pub placeholders_used: bool,
    pub raw_results: usize,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A distinct real-world entity hypothesized from the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IdentityCandidate {
    /// Distinguishing name, e.g. "Acme Corp (industrial supplies)".
    pub name: String,
    /// Why the results suggest this entity.
    pub rationale: String,
}

/// Outcome of the disambiguation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disambiguation {
    Unambiguous,
    Ambiguous { candidates: Vec<IdentityCandidate> },
}

/// How the caller resumes a halted analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum IdentitySelection {
    Candidate(String),
    ContinueWithout,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Mixed,
    Negative,
}

/// Three independent scores, each an integer in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub presence: u8,
    pub sentiment: u8,
    pub coherence: u8,
    pub sentiment_label: SentimentLabel,
}

impl ScoreTriple {
    pub fn new(presence: u8, sentiment: u8, coherence: u8, sentiment_label: SentimentLabel) -> Self {
        Self {
            presence: presence.min(100),
            sentiment: sentiment.min(100),
            coherence: coherence.min(100),
            sentiment_label,
        }
    }

    /// Mean of the three dimensions.
    pub fn aggregate(&self) -> f64 {
        (f64::from(self.presence) + f64::from(self.sentiment) + f64::from(self.coherence)) / 3.0
    }

    pub(crate) fn shifted(&self, delta: i16) -> Self {
        let shift = |v: u8| (i16::from(v) + delta).clamp(0, 100) as u8;
        Self {
            presence: shift(self.presence),
            sentiment: shift(self.sentiment),
            coherence: shift(self.coherence),
            sentiment_label: self.sentiment_label,
        }
    }
}

/// Narrative fields produced alongside the scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    pub presence_rationale: String,
    pub sentiment_rationale: String,
    pub coherence_rationale: String,
}

/// Scores plus narrative. `fallback` marks the neutral default triple
/// returned when evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub scores: ScoreTriple,
    pub narrative: Narrative,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Input for a single-entity analysis. `language`/`region` fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub name: String,
    pub message: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
    pub category: Option<EntityCategory>,
}

impl AnalysisRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn category(mut self, category: EntityCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Input for a head-to-head comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelRequest {
    pub first: String,
    pub second: String,
    pub message: Option<String>,
    pub language: Option<String>,
    pub region: Option<String>,
}

impl DuelRequest {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A completed single-entity analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAnalysis {
    pub run_id: Uuid,
    pub entity: EntityName,
    /// Candidate chosen after disambiguation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub report: ScoreReport,
    pub search: SearchStats,
    pub result_count: usize,
    /// Diversity/authority signal of the evidence, 0.0..=1.0.
    pub quality_signal: f64,
    /// True when any stage fell back (search quota, scoring fallback).
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradation_reasons: Vec<String>,
}

impl EntityAnalysis {
    pub fn scores(&self) -> &ScoreTriple {
        &self.report.scores
    }
}

/// Everything needed to resume a halted analysis. Owned by the caller;
/// the pipeline keeps no session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisambiguationTicket {
    pub run_id: Uuid,
    pub entity: EntityName,
    pub message: Option<String>,
    pub language: String,
    pub region: String,
    pub results: AggregatedResultSet,
    pub candidates: Vec<IdentityCandidate>,
    pub search: SearchStats,
}

/// Result of `analyze_entity`: scores, or a request to pick an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Scored(EntityAnalysis),
    NeedsDisambiguation(DisambiguationTicket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuelWinner {
    Entity(String),
    Tie,
}

impl Serialize for DuelWinner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DuelWinner::Entity(name) => serializer.serialize_str(name),
            DuelWinner::Tie => serializer.serialize_str("tie"),
        }
    }
}

/// Near-tie resolution applied by the differentiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TieBreak {
    pub favored: String,
    pub points: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelResult {
    pub entity1: EntityAnalysis,
    pub entity2: EntityAnalysis,
    pub winner: DuelWinner,
    /// Rounded absolute difference of the aggregate scores.
    pub margin: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<TieBreak>,
}
