use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerperError>;

#[derive(Debug, Error)]
pub enum SerperError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Search quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl SerperError {
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => SerperError::QuotaExceeded(message),
            _ => SerperError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for SerperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SerperError::Timeout
        } else if err.is_decode() {
            SerperError::Parse(err.to_string())
        } else {
            SerperError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SerperError {
    fn from(err: serde_json::Error) -> Self {
        SerperError::Parse(err.to_string())
    }
}
