use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    pub text: String,
    #[serde(default)]
    pub detected_source_language: Option<String>,
}
