use anyhow::{bail, Context, Result};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; search, scoring and duel
/// tuning live in the TOML FileConfig.
#[derive(Clone)]
pub struct AppConfig {
    // AI / LLM
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub model: String,

    // Search
    pub serper_api_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| -> Result<String> {
            let value = optional(key).with_context(|| format!("{key} environment variable is required"))?;
            Ok(value)
        };

        let config = Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_base_url: optional("OPENAI_BASE_URL"),
            model: optional("BRANDSCOPE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            serper_api_key: required("SERPER_API_KEY")?,
        };

        if let Some(url) = &config.openai_base_url {
            if url::Url::parse(url).is_err() {
                bail!("OPENAI_BASE_URL is not a valid URL: {url}");
            }
        }

        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  SERPER_API_KEY: {}", preview(&self.serper_api_key));
        tracing::info!(
            "  OPENAI_BASE_URL: {}",
            self.openai_base_url.as_deref().unwrap_or("<default>")
        );
        tracing::info!("  BRANDSCOPE_MODEL: {}", self.model);
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_api_key", &preview(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("serper_api_key", &preview(&self.serper_api_key))
            .finish()
    }
}

fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{head}...({} chars)", val.chars().count())
}
