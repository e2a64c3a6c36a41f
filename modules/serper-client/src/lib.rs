pub mod error;
pub mod types;

pub use error::{Result, SerperError};
pub use types::{OrganicResult, SearchRequest, SearchResponse};

use std::time::Duration;

use tracing::{debug, info};

const BASE_URL: &str = "https://google.serper.dev";

pub struct SerperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run one web search and return its organic results.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<OrganicResult>> {
        debug!(query = %request.q, num = request.num, "Serper search");

        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SerperError::from_status(status.as_u16(), body));
        }

        let body = resp.text().await?;
        let data: SearchResponse = serde_json::from_str(&body)?;

        info!(query = %request.q, count = data.organic.len(), "Serper search complete");
        Ok(data.organic)
    }
}

impl std::fmt::Debug for SerperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_status_maps_to_quota_exceeded() {
        assert!(matches!(
            SerperError::from_status(429, "Not enough credits".into()),
            SerperError::QuotaExceeded(_)
        ));
        assert!(matches!(
            SerperError::from_status(403, "bad key".into()),
            SerperError::Api { status: 403, .. }
        ));
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let client = SerperClient::new("key").unwrap().with_base_url("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn unreachable_host_is_network_error() {
        let client = SerperClient::with_timeout("key", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let result = tokio_test::block_on(client.search(&SearchRequest::new("acme")));
        assert!(matches!(
            result,
            Err(SerperError::Network(_)) | Err(SerperError::Timeout)
        ));
    }
}
