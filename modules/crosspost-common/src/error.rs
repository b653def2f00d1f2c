use serde::{Deserialize, Serialize};

/// Machine-readable failure codes carried on the wire. The free-text detail
/// next to them is localized; these never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidUrl,
    SiteNotFound,
    NoPostsFound,
    ConnectionFailed,
    Timeout,
    RateLimited,
    CrawlingError,
    TranslationFailed,
    InvalidParameters,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::SiteNotFound => "site_not_found",
            Self::NoPostsFound => "no_posts_found",
            Self::ConnectionFailed => "connection_failed",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::CrawlingError => "crawling_error",
            Self::TranslationFailed => "translation_failed",
            Self::InvalidParameters => "invalid_parameters",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorCode::NoPostsFound).unwrap(), "\"no_posts_found\"");
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvalidParameters).unwrap(),
            "\"invalid_parameters\""
        );
    }
}
