//! Typed errors for crawl operations.

use crosspost_common::ErrorCode;
use thiserror::Error;

/// Errors that can occur while resolving, dispatching or running a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Input could not be parsed as a URL where one was required
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// No adapter is registered for the detected site
    #[error("no crawler available for site: {site}")]
    SiteNotFound { site: String },

    /// Board resolver miss (DCInside gallery / Blind topic lookup)
    #[error("no matching board for '{input}'")]
    BoardNotFound { input: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Connection timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited,

    /// Adapter-level authentication failure (e.g. Reddit OAuth)
    #[error("authentication failed: {detail}")]
    Auth { detail: String },

    /// Response body did not have the expected shape
    #[error("parse error: {detail}")]
    Parse { detail: String },

    /// Request validation failed before dispatch
    #[error("invalid parameters: {detail}")]
    InvalidParameters { detail: String },

    /// The session's cancellation flag was observed
    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// The locale-independent code carried on the wire for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::SiteNotFound { .. } | Self::BoardNotFound { .. } => ErrorCode::SiteNotFound,
            Self::Http(_) => ErrorCode::ConnectionFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::InvalidParameters { .. } => ErrorCode::InvalidParameters,
            Self::Auth { .. } | Self::Parse { .. } | Self::Cancelled => ErrorCode::CrawlingError,
        }
    }

    /// Wrap a reqwest failure, preserving the timeout/rate-limit distinction.
    pub fn from_request(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            Self::RateLimited
        } else {
            Self::Http(Box::new(err))
        }
    }
}

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_wire_taxonomy() {
        assert_eq!(
            CrawlError::BoardNotFound { input: "x".into() }.error_code(),
            ErrorCode::SiteNotFound
        );
        assert_eq!(
            CrawlError::Timeout { url: "u".into() }.error_code(),
            ErrorCode::Timeout
        );
        assert_eq!(
            CrawlError::InvalidParameters { detail: "d".into() }.error_code(),
            ErrorCode::InvalidParameters
        );
    }
}
