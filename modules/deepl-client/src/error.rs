use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeeplError>;

#[derive(Debug, Error)]
pub enum DeeplError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Translation timed out")]
    Timeout,

    #[error("Empty translation in response")]
    EmptyResponse,
}

impl From<reqwest::Error> for DeeplError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeeplError::Timeout
        } else {
            DeeplError::Network(err.to_string())
        }
    }
}
