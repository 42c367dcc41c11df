use thiserror::Error;

pub type Result<T> = std::result::Result<T, VeniceError>;

#[derive(Debug, Error)]
pub enum VeniceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Empty response: {0}")]
    Empty(&'static str),
}

impl From<reqwest::Error> for VeniceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return VeniceError::Parse(err.to_string());
        }
        VeniceError::Network(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for VeniceError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        VeniceError::Header(err.to_string())
    }
}
