//! The session controller: one WebSocket connection drives one crawl
//! end-to-end. Config comes in as a single frame; progress, terminal result
//! and errors stream back out. Cancellation arrives out-of-band through the
//! REST endpoint and is observed cooperatively at every stage.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use crosspost_common::{
    details, messages, CancelFlag, Config, CrawlStep, ErrorCode, Locale, PostRecord, ProgressSink,
    ServerMessage,
};
use crosspost_core::CrawlError;
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Close code sent when the origin check rejects a production connection.
const POLICY_VIOLATION: u16 = 1008;

/// Config keys consumed by the session itself, never forwarded to dispatch.
const SESSION_KEYS: &[&str] = &[
    "input",
    "translate",
    "target_languages",
    "skip_translation",
    "language",
    "include_media",
    "crawl_id",
];

pub async fn ws_crawl(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let allowed = origin_allowed(&state.config, &origin);
    if !allowed {
        tracing::warn!(origin = %origin, "rejecting session from disallowed origin");
    }
    ws.on_upgrade(move |socket| handle_session(state, socket, allowed))
}

/// Any origin passes outside production; in production the configured
/// allow-list decides (substring match, so bare domains cover subdomains).
pub fn origin_allowed(config: &Config, origin: &str) -> bool {
    if !config.is_production() {
        return true;
    }
    config
        .allowed_origins
        .iter()
        .any(|pattern| !pattern.is_empty() && origin.contains(pattern))
}

async fn handle_session(state: Arc<AppState>, mut socket: WebSocket, origin_allowed: bool) {
    if !origin_allowed {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: POLICY_VIOLATION,
                reason: "invalid origin".into(),
            })))
            .await;
        return;
    }

    // Single config frame opens the session.
    let raw_config = match receive_config(&mut socket).await {
        Some(config) => config,
        None => {
            let _ = socket.close().await;
            return;
        }
    };
    let locale = raw_config
        .get("language")
        .and_then(|v| v.as_str())
        .map(Locale::from_tag)
        .unwrap_or_default();

    let crawl_id = format!("crawl_{}", uuid::Uuid::new_v4());
    let cancel = state.register_session(crawl_id.clone()).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let sink = ProgressSink::new(tx);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound relay: frames leave in send order; a write failure cancels
    // the crawl since nobody is listening anymore.
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let payload = match serde_json::to_string(&frame) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode frame");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                writer_cancel.cancel();
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Inbound watch: a client that goes away cancels its crawl.
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => {
                    reader_cancel.cancel();
                    break;
                }
                _ => {}
            }
        }
        reader_cancel.cancel();
    });

    run_session(&state, &crawl_id, raw_config, locale, &sink, &cancel).await;

    drop(sink);
    let _ = writer.await;
    reader.abort();
    state.remove_session(&crawl_id).await;
}

async fn receive_config(socket: &mut WebSocket) -> Option<Map<String, Value>> {
    while let Some(message) = socket.recv().await {
        match message.ok()? {
            Message::Text(text) => {
                return serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|v| v.as_object().cloned());
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

async fn run_session(
    state: &AppState,
    crawl_id: &str,
    mut raw_config: Map<String, Value>,
    locale: Locale,
    sink: &ProgressSink,
    cancel: &CancelFlag,
) {
    let input = raw_config
        .get("input")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    if input.is_empty() {
        sink.send_terminal(ServerMessage::error(
            ErrorCode::InvalidParameters,
            messages::error_text(locale, ErrorCode::InvalidParameters),
            None,
        ));
        return;
    }

    let translate = raw_config.get("translate").and_then(|v| v.as_bool()).unwrap_or(false);
    let skip_translation = raw_config
        .get("skip_translation")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let target_languages: Vec<String> = raw_config
        .get("target_languages")
        .and_then(|v| v.as_array())
        .map(|langs| {
            langs
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let include_media = raw_config
        .get("include_media")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    for key in SESSION_KEYS {
        raw_config.remove(*key);
    }

    sink.progress(
        5,
        CrawlStep::Initializing,
        None,
        None,
        details! { "crawl_id" => crawl_id },
    );
    sink.status(8, CrawlStep::DetectingSite, None, None, messages::step_text(locale, CrawlStep::DetectingSite, None));

    let site = state.detector.detect(&input).await;
    let board_identifier = state.detector.extract_board_identifier(&input, site);
    tracing::info!(site = %site, board = %board_identifier, crawl_id, "site detected");

    if cancel.is_cancelled() {
        sink.send_terminal(ServerMessage::cancelled());
        return;
    }
    sink.status(
        15,
        CrawlStep::Connecting,
        Some(site),
        Some(&board_identifier),
        messages::step_text(locale, CrawlStep::Connecting, Some(site)),
    );

    let results = state
        .registry
        .dispatch(site, &board_identifier, raw_config, sink, cancel)
        .await;

    let mut results = match results {
        Ok(results) => results,
        Err(CrawlError::Cancelled) => {
            sink.send_terminal(ServerMessage::cancelled());
            return;
        }
        Err(err) => {
            let code = err.error_code();
            tracing::warn!(site = %site, crawl_id, error = %err, "crawl failed");
            sink.send_terminal(ServerMessage::error(
                code,
                format!("{}: {err}", messages::error_text(locale, code)),
                Some(site),
            ));
            return;
        }
    };

    if results.is_empty() {
        sink.send_terminal(ServerMessage::error(
            ErrorCode::NoPostsFound,
            messages::error_text(locale, ErrorCode::NoPostsFound),
            Some(site),
        ));
        return;
    }

    sink.status(
        78,
        CrawlStep::Processing,
        Some(site),
        Some(&board_identifier),
        messages::step_text(locale, CrawlStep::Processing, Some(site)),
    );

    let translating = !skip_translation && translate && !target_languages.is_empty();
    if translating {
        if let Some(deepl) = &state.deepl {
            if translate_titles(deepl, &mut results, &target_languages, locale, sink, cancel)
                .await
                .is_err()
            {
                sink.send_terminal(ServerMessage::cancelled());
                return;
            }
        } else {
            tracing::warn!("translation requested but no DEEPL_API_KEY configured");
        }
    } else {
        sink.status(
            85,
            CrawlStep::Translating,
            Some(site),
            None,
            match locale {
                Locale::Ko => "번역 건너뛰기".to_string(),
                Locale::En => "Skipping translation".to_string(),
            },
        );
    }

    if cancel.is_cancelled() {
        sink.send_terminal(ServerMessage::cancelled());
        return;
    }

    let mut summary = match locale {
        Locale::Ko => format!("크롤링 완료: {}개 게시물", results.len()),
        Locale::En => format!("Crawl complete: {} posts", results.len()),
    };

    if include_media {
        match state.packager.package(&results, site, sink, cancel).await {
            Ok(Some(archive)) => {
                sink.progress(
                    97,
                    CrawlStep::Packaging,
                    Some(site),
                    None,
                    details! {
                        "archive" => archive.file_name.clone(),
                        "download_url" => format!("/api/download-file/{}", archive.file_name),
                        "entries" => archive.entry_count,
                        "skipped" => archive.skipped,
                    },
                );
                summary.push_str(&format!(" ({} media files)", archive.entry_count));
            }
            Ok(None) => {}
            Err(crosspost_media::MediaError::Cancelled) => {
                sink.send_terminal(ServerMessage::cancelled());
                return;
            }
            Err(err) => {
                // Media problems never sink a finished crawl.
                tracing::warn!(error = %err, "media packaging failed");
            }
        }
    }

    sink.status(
        98,
        CrawlStep::Finalizing,
        Some(site),
        Some(&board_identifier),
        messages::step_text(locale, CrawlStep::Finalizing, Some(site)),
    );
    sink.send_terminal(ServerMessage::done(results, site, summary));
    tracing::info!(crawl_id, "session complete");
}

/// Per-(post, language) translation with the same-language skip heuristic.
/// Failures leave the original title in place. Returns Err only on
/// cancellation.
async fn translate_titles(
    deepl: &deepl_client::DeeplClient,
    results: &mut [PostRecord],
    target_languages: &[String],
    locale: Locale,
    sink: &ProgressSink,
    cancel: &CancelFlag,
) -> Result<(), ()> {
    let total = results.len();
    sink.status(
        80,
        CrawlStep::Translating,
        None,
        None,
        messages::step_text(locale, CrawlStep::Translating, None),
    );

    for (index, post) in results.iter_mut().enumerate() {
        if cancel.is_cancelled() {
            return Err(());
        }

        for (lang_index, lang) in target_languages.iter().enumerate() {
            if already_in_language(&post.title_original, lang) {
                if lang_index == 0 {
                    post.title_translated = Some(post.title_original.clone());
                }
                continue;
            }
            if cancel.is_cancelled() {
                return Err(());
            }

            match deepl.translate(&post.title_original, lang).await {
                Ok(translated) => {
                    if lang_index == 0 {
                        post.title_translated = Some(translated);
                    } else {
                        post.extras.insert(
                            format!("title_translated_{}", lang.to_lowercase()),
                            Value::String(translated),
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(lang = %lang, error = %err, "translation failed, keeping original");
                }
            }
        }

        let pct = 80 + (((index + 1) as f64 / total as f64) * 15.0) as u8;
        sink.progress(
            pct,
            CrawlStep::Translating,
            None,
            None,
            details! { "translated" => index + 1, "total" => total },
        );
    }
    Ok(())
}

/// Titles already in the target language skip the API call: an all-ASCII
/// title is treated as English, one with any Hangul-range code point as
/// Korean.
pub fn already_in_language(title: &str, target_lang: &str) -> bool {
    match target_lang.to_ascii_lowercase().as_str() {
        "en" | "en-us" | "en-gb" => title.chars().all(|c| (c as u32) <= 127),
        "ko" | "kr" => title.chars().any(|c| (c as u32) > 127),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(app_env: &str, origins: &[&str]) -> Config {
        Config {
            app_env: app_env.to_string(),
            port: 8000,
            log_level: "info".to_string(),
            deepl_api_key: None,
            reddit_client_id: None,
            reddit_client_secret: None,
            reddit_user_agent: "test".to_string(),
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
            data_dir: "id_data".into(),
            media_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn dev_accepts_any_origin() {
        let config = config("development", &[]);
        assert!(origin_allowed(&config, "https://anywhere.example"));
        assert!(origin_allowed(&config, ""));
    }

    #[test]
    fn production_requires_allow_listed_origin() {
        let config = config("production", &["netlify.app", "onrender.com"]);
        assert!(origin_allowed(&config, "https://myapp.netlify.app"));
        assert!(origin_allowed(&config, "https://api.onrender.com"));
        assert!(!origin_allowed(&config, "https://evil.example"));

        let empty = config_empty();
        assert!(!origin_allowed(&empty, "https://myapp.netlify.app"));
    }

    fn config_empty() -> Config {
        config("production", &[])
    }

    #[test]
    fn language_skip_heuristic() {
        assert!(already_in_language("Plain English title", "en"));
        assert!(!already_in_language("한국어 제목", "en"));
        assert!(already_in_language("한국어 제목", "ko"));
        assert!(!already_in_language("Plain English title", "ko"));
        assert!(!already_in_language("Anything", "fr"));
    }
}
