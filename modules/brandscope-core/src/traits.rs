// Provider seams for the reputation pipeline.
//
// SearchProvider: one web search query in, organic results out.
// StructuredLlm:  schema-constrained completion in, JSON value out.
//
// The orchestration code only sees these two traits, so it runs against
// Serper/OpenAI in production and against the fakes in `testing` under
// `cargo test`: no network, no keys.

use std::future::Future;
use std::time::Duration;

use ai_client::{AiError, OpenAi, StructuredOutput};
use async_trait::async_trait;
use serper_client::{SearchRequest, SerperClient, SerperError};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::types::{SearchOptions, SearchResult};

// ---------------------------------------------------------------------------
// SearchProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query. `QuotaExceeded` signals HTTP 429.
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, ProviderError>;
}

#[async_trait]
impl SearchProvider for SerperClient {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let request = SearchRequest::new(query)
            .language(&options.language)
            .region(&options.region)
            .num(options.max_results_per_query);

        let organic = SerperClient::search(self, &request).await.map_err(|e| match e {
            SerperError::QuotaExceeded(_) => ProviderError::QuotaExceeded,
            SerperError::Timeout => ProviderError::Timeout,
            SerperError::Parse(msg) => ProviderError::MalformedResponse(msg),
            other => ProviderError::Request(other.to_string()),
        })?;

        Ok(organic
            .into_iter()
            .map(|r| SearchResult {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// StructuredLlm
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StructuredLlm: Send + Sync {
    /// Schema-constrained completion. A body that is not JSON is
    /// `MalformedResponse`.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;
}

#[async_trait]
impl StructuredLlm for OpenAi {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let body = self
            .structured_output(system_prompt, user_prompt, schema_name, schema)
            .await
            .map_err(|e| match e {
                AiError::RateLimited(_) => ProviderError::QuotaExceeded,
                AiError::Timeout => ProviderError::Timeout,
                AiError::Parse(msg) => ProviderError::MalformedResponse(msg),
                AiError::EmptyResponse => {
                    ProviderError::MalformedResponse("empty response".to_string())
                }
                other => ProviderError::Request(other.to_string()),
            })?;

        serde_json::from_str(&body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

/// Ask for `T`'s schema and deserialize the answer into `T`. A response that
/// does not fit the schema is `MalformedResponse`.
pub async fn complete_structured<T: StructuredOutput>(
    llm: &dyn StructuredLlm,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T, ProviderError> {
    let value = llm
        .complete(
            system_prompt,
            user_prompt,
            &T::schema_name_for_wire(),
            T::openai_schema(),
        )
        .await?;
    serde_json::from_value(value).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Race an external call against its deadline and the caller's token.
pub(crate) async fn bounded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        },
    }
}

/// Cancellable sleep. `false` when the token fired first.
pub(crate) async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
