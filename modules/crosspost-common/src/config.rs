use anyhow::Result;
use std::path::PathBuf;

/// Application configuration loaded from environment variables. Contains
/// only secrets and env-specific values; site tables and selector lists are
/// compiled in.
#[derive(Debug, Clone)]
pub struct Config {
    /// `production` enables the origin allow-list on the session endpoint.
    pub app_env: String,
    pub port: u16,
    pub log_level: String,

    // Translation
    pub deepl_api_key: Option<String>,

    // Reddit API (client-credentials OAuth)
    pub reddit_client_id: Option<String>,
    pub reddit_client_secret: Option<String>,
    pub reddit_user_agent: String,

    /// Origins accepted by the session endpoint in production.
    pub allowed_origins: Vec<String>,

    /// Directory holding the board lookup tables (galleries.json, boards.json).
    pub data_dir: PathBuf,
    /// Directory where media archives are assembled and served from.
    pub media_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a number"))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            deepl_api_key: std::env::var("DEEPL_API_KEY").ok().filter(|v| !v.is_empty()),
            reddit_client_id: std::env::var("REDDIT_CLIENT_ID").ok().filter(|v| !v.is_empty()),
            reddit_client_secret: std::env::var("REDDIT_CLIENT_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),
            reddit_user_agent: std::env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "crosspost/0.1".to_string()),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("id_data")),
            media_dir: std::env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("crosspost-media")),
        };

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Log which secrets are present without exposing their values.
    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.len().min(4);
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  APP_ENV: {}", self.app_env);
        tracing::info!("  PORT: {}", self.port);
        tracing::info!("  DEEPL_API_KEY: {}", preview(&self.deepl_api_key));
        tracing::info!("  REDDIT_CLIENT_ID: {}", preview(&self.reddit_client_id));
        tracing::info!("  REDDIT_CLIENT_SECRET: {}", preview(&self.reddit_client_secret));
        tracing::info!("  DATA_DIR: {}", self.data_dir.display());
        tracing::info!("  MEDIA_DIR: {}", self.media_dir.display());
        if !self.allowed_origins.is_empty() {
            tracing::info!("  ALLOWED_ORIGINS: {} entries", self.allowed_origins.len());
        }
    }
}
