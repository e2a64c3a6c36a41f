//! Sequential execution of a query plan against the search provider.
//!
//! Queries run one at a time in plan order with a fixed pause between them,
//! so one entity never bursts the provider's shared rate budget and the raw
//! output is in first-seen order. Failure policy per query:
//!
//! - timeout: counted, the plan continues
//! - HTTP 429: the rest of the plan is skipped; if nothing real was found,
//!   synthetic placeholder results stand in so later stages get input
//! - anything else: logged, the plan continues
//! - cancellation: the whole execution stops with `PipelineError::Cancelled`

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, ProviderError};
use crate::file_config::SearchConfig;
use crate::traits::{bounded, pause, SearchProvider};
use crate::types::{QueryPlan, SearchOptions, SearchResult, SearchStats};

pub(crate) const PLACEHOLDER_MARKER: &str = "[placeholder]";

/// Raw (not yet deduplicated) results plus how the run went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
}

pub struct SearchExecutor {
    provider: Arc<dyn SearchProvider>,
    query_timeout: Duration,
    inter_query_delay: Duration,
    placeholder_count: usize,
}

impl SearchExecutor {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            query_timeout: config.query_timeout(),
            inter_query_delay: config.inter_query_delay(),
            placeholder_count: config.placeholder_count,
        }
    }

    pub async fn execute(
        &self,
        plan: &QueryPlan,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, PipelineError> {
        let mut results = Vec::new();
        let mut stats = SearchStats {
            queries_planned: plan.len(),
            ..Default::default()
        };
        let per_query = options.max_results_per_query as usize;

        for (i, query) in plan.iter().enumerate() {
            if i > 0 && !pause(cancel, self.inter_query_delay).await {
                return Err(PipelineError::Cancelled);
            }

            match bounded(cancel, self.query_timeout, self.provider.search(query, options)).await {
                Ok(mut hits) => {
                    hits.truncate(per_query);
                    debug!(query, hits = hits.len(), "Search query succeeded");
                    stats.queries_succeeded += 1;
                    results.extend(hits);
                }
                Err(ProviderError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(ProviderError::QuotaExceeded) => {
                    warn!(
                        query,
                        skipped = plan.len() - i - 1,
                        "Search quota exhausted, aborting remaining queries"
                    );
                    stats.quota_exhausted = true;
                    break;
                }
                Err(ProviderError::Timeout) => {
                    warn!(query, timeout_ms = self.query_timeout.as_millis() as u64, "Search query timed out");
                    stats.queries_timed_out += 1;
                }
                Err(e) => {
                    warn!(query, error = %e, "Search query failed");
                    stats.queries_failed += 1;
                }
            }
        }

        stats.raw_results = results.len();

        if stats.quota_exhausted && results.is_empty() {
            warn!(count = self.placeholder_count, "No real results before quota ran out, substituting placeholders");
            results = placeholder_results(self.placeholder_count);
            stats.placeholders_used = true;
        }

        info!(
            planned = stats.queries_planned,
            succeeded = stats.queries_succeeded,
            failed = stats.queries_failed,
            timed_out = stats.queries_timed_out,
            raw_results = stats.raw_results,
            "Search phase complete"
        );

        Ok(SearchOutcome { results, stats })
    }
}

/// Synthetic stand-ins. No URL, so they never collapse into one another
/// during aggregation and contribute nothing to the quality signal.
pub(crate) fn placeholder_results(count: usize) -> Vec<SearchResult> {
    (1..=count)
        .map(|n| SearchResult {
            title: Some(format!("{PLACEHOLDER_MARKER} Search unavailable ({n})")),
            url: None,
            snippet: Some(
                "Search quota was exhausted before live results could be collected.".to_string(),
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{result, MockSearchProvider};

    fn plan(queries: &[&str]) -> QueryPlan {
        QueryPlan::from_variants(queries.iter().map(|q| q.to_string()))
    }

    fn options() -> SearchOptions {
        SearchOptions {
            language: "en".into(),
            region: "us".into(),
            max_results_per_query: 10,
        }
    }

    fn executor(provider: MockSearchProvider) -> (SearchExecutor, Arc<MockSearchProvider>) {
        let provider = Arc::new(provider);
        (SearchExecutor::new(provider.clone(), &SearchConfig::default()), provider)
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_plan_order() {
        let (executor, provider) = executor(
            MockSearchProvider::new()
                .on_query("a", vec![result("https://a.com/1"), result("https://a.com/2")])
                .on_query("b", vec![result("https://b.com/1")]),
        );

        let outcome = executor
            .execute(&plan(&["a", "b"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        let urls: Vec<_> = outcome.results.iter().map(|r| r.url.clone().unwrap()).collect();
        assert_eq!(urls, ["https://a.com/1", "https://a.com/2", "https://b.com/1"]);
        assert_eq!(outcome.stats.queries_succeeded, 2);
        assert_eq!(provider.calls(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_queries_but_not_after_the_last() {
        let (executor, _) = executor(MockSearchProvider::new());
        let started = tokio::time::Instant::now();

        executor
            .execute(&plan(&["a", "b", "c"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(450), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_is_abandoned_and_the_plan_continues() {
        let (executor, _) = executor(
            MockSearchProvider::new()
                .hang_query("slow")
                .on_query("fast", vec![result("https://fast.com")]),
        );

        let outcome = executor
            .execute(&plan(&["slow", "fast"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.queries_timed_out, 1);
        assert_eq!(outcome.results, vec![result("https://fast.com")]);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_exhaustion_aborts_and_substitutes_placeholders() {
        let (executor, provider) = executor(
            MockSearchProvider::new().fail_query("a", ProviderError::QuotaExceeded),
        );

        let outcome = executor
            .execute(&plan(&["a", "b", "c"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(provider.calls(), vec!["a"]);
        assert!(outcome.stats.quota_exhausted);
        assert!(outcome.stats.placeholders_used);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|r| r.url.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn quota_after_real_hits_keeps_partial_results() {
        let (executor, _) = executor(
            MockSearchProvider::new()
                .on_query("a", vec![result("https://a.com")])
                .fail_query("b", ProviderError::QuotaExceeded),
        );

        let outcome = executor
            .execute(&plan(&["a", "b", "c"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.stats.quota_exhausted);
        assert!(!outcome.stats.placeholders_used);
        assert_eq!(outcome.results, vec![result("https://a.com")]);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_logged_and_skipped() {
        let (executor, _) = executor(
            MockSearchProvider::new()
                .fail_query("a", ProviderError::Request("502 Bad Gateway".into()))
                .on_query("b", vec![result("https://b.com")]),
        );

        let outcome = executor
            .execute(&plan(&["a", "b"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stats.queries_failed, 1);
        assert!(!outcome.stats.placeholders_used);
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn per_query_results_are_truncated() {
        let hits = (0..15).map(|i| result(&format!("https://a.com/{i}"))).collect();
        let (executor, _) = executor(MockSearchProvider::new().on_query("a", hits));

        let outcome = executor
            .execute(&plan(&["a"]), &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_plan() {
        let (executor, provider) = executor(MockSearchProvider::new().hang_query("a"));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = executor
            .execute(&plan(&["a", "b"]), &options(), &cancel)
            .await;

        assert_eq!(outcome, Err(PipelineError::Cancelled));
        assert_eq!(provider.calls(), vec!["a"]);
    }
}
