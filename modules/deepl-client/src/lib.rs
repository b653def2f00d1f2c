pub mod error;
pub mod types;

pub use error::{DeeplError, Result};
pub use types::{TranslateResponse, Translation};

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api-free.deepl.com/v2";

/// Requests past this length are truncated before sending.
const MAX_TEXT_LEN: usize = 4000;

/// Per-call timeout. A slow translation is dropped rather than stalling the
/// session that asked for it.
const TRANSLATE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeeplClient {
    client: reqwest::Client,
    base_url: String,
    auth_key: String,
}

impl DeeplClient {
    pub fn new(auth_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_key,
        }
    }

    /// Point the client at a different API host. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Translate `text` into `target_lang` (ISO 639-1, case-insensitive).
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let text = if text.len() > MAX_TEXT_LEN {
            let mut end = MAX_TEXT_LEN;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        };

        let url = format!("{}/translate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(TRANSLATE_TIMEOUT)
            .form(&[
                ("auth_key", self.auth_key.as_str()),
                ("text", text),
                ("target_lang", &target_lang.to_uppercase()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeeplError::Api { status: status.as_u16(), message: body });
        }

        let parsed: TranslateResponse = resp.json().await?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or(DeeplError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn translate_returns_first_translation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": [{"text": "안녕하세요", "detected_source_language": "EN"}]
            })))
            .mount(&server)
            .await;

        let client = DeeplClient::new("key".into()).with_base_url(server.uri());
        let out = client.translate("hello", "ko").await.unwrap();
        assert_eq!(out, "안녕하세요");
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(456).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = DeeplClient::new("key".into()).with_base_url(server.uri());
        match client.translate("hello", "ko").await {
            Err(DeeplError::Api { status, message }) => {
                assert_eq!(status, 456);
                assert!(message.contains("quota"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_translations_list_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"translations": []})),
            )
            .mount(&server)
            .await;

        let client = DeeplClient::new("key".into()).with_base_url(server.uri());
        assert!(matches!(client.translate("hi", "ko").await, Err(DeeplError::EmptyResponse)));
    }
}
