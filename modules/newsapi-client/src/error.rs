use thiserror::Error;

pub type Result<T> = std::result::Result<T, NewsApiError>;

#[derive(Debug, Error)]
pub enum NewsApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for NewsApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return NewsApiError::Parse(err.to_string());
        }
        NewsApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for NewsApiError {
    fn from(err: serde_json::Error) -> Self {
        NewsApiError::Parse(err.to_string())
    }
}
