// Test fakes for the reputation pipeline.
//
// Two fakes matching the two provider seams:
// - MockSearchProvider (SearchProvider): query string → scripted results or error
// - MockLlm (StructuredLlm): schema name → queue of scripted JSON bodies or errors
//
// Plus helpers for building search results and evaluator responses.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::traits::{SearchProvider, StructuredLlm};
use crate::types::{SearchOptions, SearchResult};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A search hit whose title and snippet are derived from the URL.
pub fn result(url: &str) -> SearchResult {
    SearchResult::new(format!("Result {url}"), url, format!("Snippet about {url}"))
}

/// A search hit with explicit text, for tests that match on content.
pub fn result_with_text(url: &str, title: &str, snippet: &str) -> SearchResult {
    SearchResult::new(title, url, snippet)
}

/// A valid `ScoringResponse` body with the given raw scores.
pub fn scoring_json(presence: i64, sentiment: i64, coherence: i64) -> Value {
    json!({
        "presence": presence,
        "presence_rationale": "Found across several independent sources.",
        "sentiment": sentiment,
        "sentiment_rationale": "Coverage is mostly factual.",
        "sentiment_label": "neutral",
        "coherence": coherence,
        "coherence_rationale": "The claim matches what sources describe.",
        "summary": "A visible entity with mostly neutral coverage."
    })
}

/// An `EntityGrouping` body. Two or more candidates read as ambiguous.
pub fn grouping_json(candidates: &[(&str, &str)]) -> Value {
    json!({
        "ambiguous": candidates.len() > 1,
        "candidates": candidates
            .iter()
            .map(|(name, rationale)| json!({ "name": name, "rationale": rationale }))
            .collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// MockSearchProvider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Scripted {
    Results(Vec<SearchResult>),
    Error(ProviderError),
    Hang,
}

/// Query-keyed search fake. Unregistered queries return no results.
/// Builder pattern: `.on_query()`, `.fail_query()`, `.hang_query()`.
pub struct MockSearchProvider {
    queries: HashMap<String, Scripted>,
    otherwise: Scripted,
    calls: Mutex<Vec<String>>,
}

impl MockSearchProvider {
    pub fn new() -> Self {
        Self {
            queries: HashMap::new(),
            otherwise: Scripted::Results(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.queries
            .insert(query.to_string(), Scripted::Results(results));
        self
    }

    pub fn fail_query(mut self, query: &str, error: ProviderError) -> Self {
        self.queries.insert(query.to_string(), Scripted::Error(error));
        self
    }

    /// The query never answers; only a deadline or cancellation ends it.
    pub fn hang_query(mut self, query: &str) -> Self {
        self.queries.insert(query.to_string(), Scripted::Hang);
        self
    }

    /// Error returned for every query not registered explicitly.
    pub fn fail_unregistered(mut self, error: ProviderError) -> Self {
        self.otherwise = Scripted::Error(error);
        self
    }

    /// Queries issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.calls.lock().unwrap().push(query.to_string());
        let scripted = self
            .queries
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.otherwise.clone());
        match scripted {
            Scripted::Results(results) => Ok(results),
            Scripted::Error(error) => Err(error),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

/// Schema-keyed LLM fake. Each schema name holds a queue of responses; the
/// last one repeats once the others are used up. Routes registered with
/// `.respond_for()` / `.fail_for()` win when the user prompt contains their
/// fragment. Unscripted schemas fail with `ProviderError::Request`.
pub struct MockLlm {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ProviderError>>>>,
    routes: Vec<(String, String, Result<Value, ProviderError>)>,
    calls: Mutex<HashMap<String, usize>>,
    prompts: Mutex<Vec<(String, String)>>,
    latency: Option<Duration>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            routes: Vec::new(),
            calls: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    pub fn respond(self, schema_name: &str, body: Value) -> Self {
        self.push(schema_name, Ok(body))
    }

    pub fn fail(self, schema_name: &str, error: ProviderError) -> Self {
        self.push(schema_name, Err(error))
    }

    /// Answer `schema_name` with `body` whenever the user prompt contains
    /// `fragment`, e.g. `"Entity: Acme\n"` to script one side of a duel.
    pub fn respond_for(mut self, schema_name: &str, fragment: &str, body: Value) -> Self {
        self.routes
            .push((schema_name.to_string(), fragment.to_string(), Ok(body)));
        self
    }

    pub fn fail_for(mut self, schema_name: &str, fragment: &str, error: ProviderError) -> Self {
        self.routes
            .push((schema_name.to_string(), fragment.to_string(), Err(error)));
        self
    }

    /// Sleep this long before every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(self, schema_name: &str, response: Result<Value, ProviderError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// How many completions were requested for `schema_name`.
    pub fn calls(&self, schema_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(schema_name)
            .copied()
            .unwrap_or(0)
    }

    /// User prompts sent for `schema_name`, in order.
    pub fn prompts(&self, schema_name: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(schema, _)| schema == schema_name)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn next_response(&self, schema_name: &str, user_prompt: &str) -> Result<Value, ProviderError> {
        let routed = self
            .routes
            .iter()
            .find(|(schema, fragment, _)| schema == schema_name && user_prompt.contains(fragment.as_str()));
        if let Some((_, _, response)) = routed {
            return response.clone();
        }

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(schema_name) else {
            return Err(ProviderError::Request(format!(
                "MockLlm: no response scripted for {schema_name}"
            )));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StructuredLlm for MockLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        _schema: Value,
    ) -> Result<Value, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(schema_name.to_string())
            .or_default() += 1;
        self.prompts
            .lock()
            .unwrap()
            .push((schema_name.to_string(), user_prompt.to_string()));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_response(schema_name, user_prompt)
    }
}
