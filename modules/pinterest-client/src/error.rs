use thiserror::Error;

pub type Result<T> = std::result::Result<T, PinterestError>;

#[derive(Debug, Error)]
pub enum PinterestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PinterestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return PinterestError::Parse(err.to_string());
        }
        PinterestError::Network(err.to_string())
    }
}
