use thiserror::Error;

pub type Result<T> = std::result::Result<T, BannerbearError>;

#[derive(Debug, Error)]
pub enum BannerbearError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BannerbearError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return BannerbearError::Parse(err.to_string());
        }
        BannerbearError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for BannerbearError {
    fn from(err: serde_json::Error) -> Self {
        BannerbearError::Parse(err.to_string())
    }
}
