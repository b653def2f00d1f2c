use chrono::{DateTime, Utc};
use crosspost_common::{CancelFlag, Config};
use crosspost_core::{BoardTables, SiteDetector, SiteRegistry};
use crosspost_media::MediaPackager;
use deepl_client::DeeplClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One live crawl session, registered at handshake and dropped on close.
pub struct SessionHandle {
    pub cancel: CancelFlag,
    pub created_at: DateTime<Utc>,
}

pub struct AppState {
    pub config: Config,
    pub detector: SiteDetector,
    pub registry: SiteRegistry,
    pub tables: Arc<BoardTables>,
    pub packager: MediaPackager,
    pub deepl: Option<DeeplClient>,
    /// Session table, keyed by crawl id. Short-held lock; only the cancel
    /// endpoint and session setup/teardown touch it.
    pub sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::new();
        let tables = Arc::new(BoardTables::load(&config.data_dir));
        let registry = crosspost_core::build_registry(client.clone(), &config, tables.clone());
        let packager = MediaPackager::new(client.clone(), config.media_dir.clone());
        let deepl = config.deepl_api_key.clone().map(DeeplClient::new);

        Self {
            config,
            detector: SiteDetector::new(),
            registry,
            tables,
            packager,
            deepl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register_session(&self, id: String) -> CancelFlag {
        let cancel = CancelFlag::new();
        self.sessions.lock().await.insert(
            id,
            SessionHandle { cancel: cancel.clone(), created_at: Utc::now() },
        );
        cancel
    }

    pub async fn remove_session(&self, id: &str) {
        self.sessions.lock().await.remove(id);
    }

    /// Flag a session for cancellation. Succeeds silently for unknown ids;
    /// the endpoint's contract is fire-and-forget.
    pub async fn cancel_session(&self, id: &str) -> bool {
        match self.sessions.lock().await.get(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
