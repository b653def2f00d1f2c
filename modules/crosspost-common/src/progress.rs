use crate::error::ErrorCode;
use crate::types::{PostRecord, SiteType};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Phase labels carried on progress frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStep {
    Initializing,
    DetectingSite,
    Connecting,
    Collecting,
    Filtering,
    Processing,
    Translating,
    Packaging,
    Finalizing,
    Complete,
}

/// Server → client frames. A session sends zero or more `Progress` frames
/// followed by exactly one terminal frame (`Done`, `Cancelled` or `Error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Done {
        done: bool,
        data: Vec<PostRecord>,
        progress: u8,
        detected_site: SiteType,
        summary: String,
    },
    Cancelled {
        cancelled: bool,
    },
    Error {
        error_code: ErrorCode,
        error_detail: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        site: Option<SiteType>,
    },
    Progress {
        progress: u8,
        step: CrawlStep,
        #[serde(skip_serializing_if = "Option::is_none")]
        site: Option<SiteType>,
        #[serde(skip_serializing_if = "Option::is_none")]
        board: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        details: serde_json::Map<String, serde_json::Value>,
    },
}

impl ServerMessage {
    pub fn done(data: Vec<PostRecord>, detected_site: SiteType, summary: impl Into<String>) -> Self {
        Self::Done { done: true, data, progress: 100, detected_site, summary: summary.into() }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled { cancelled: true }
    }

    pub fn error(code: ErrorCode, detail: impl Into<String>, site: Option<SiteType>) -> Self {
        Self::Error { error_code: code, error_detail: detail.into(), site }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Outbound progress channel for one session. Values are clamped to
/// `[0, 100]` and never decrease within the session; terminal frames pass
/// through untouched.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
    high_water: Arc<AtomicU8>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx, high_water: Arc::new(AtomicU8::new(0)) }
    }

    /// A sink whose receiver is already gone. Frames are dropped silently;
    /// useful for crawls driven without a listening client.
    pub fn discard() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self::new(tx)
    }

    pub fn progress(
        &self,
        progress: u8,
        step: CrawlStep,
        site: Option<SiteType>,
        board: Option<&str>,
        details: serde_json::Map<String, serde_json::Value>,
    ) {
        let clamped = progress.min(100);
        let floor = self.high_water.fetch_max(clamped, Ordering::SeqCst);
        let value = clamped.max(floor);
        let _ = self.tx.send(ServerMessage::Progress {
            progress: value,
            step,
            site,
            board: board.map(|b| b.to_string()),
            status: None,
            details,
        });
    }

    pub fn status(
        &self,
        progress: u8,
        step: CrawlStep,
        site: Option<SiteType>,
        board: Option<&str>,
        status: impl Into<String>,
    ) {
        let clamped = progress.min(100);
        let floor = self.high_water.fetch_max(clamped, Ordering::SeqCst);
        let value = clamped.max(floor);
        let _ = self.tx.send(ServerMessage::Progress {
            progress: value,
            step,
            site,
            board: board.map(|b| b.to_string()),
            status: Some(status.into()),
            details: serde_json::Map::new(),
        });
    }

    pub fn send_terminal(&self, message: ServerMessage) {
        let _ = self.tx.send(message);
    }
}

/// Shorthand for building a `details` object from key/value pairs.
#[macro_export]
macro_rules! details {
    ($($key:expr => $value:expr),* $(,)?) => {{
        let mut map = serde_json::Map::new();
        $( map.insert($key.to_string(), serde_json::json!($value)); )*
        map
    }};
}
