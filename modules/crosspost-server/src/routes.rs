//! REST endpoints next to the session channel: cancellation, autocomplete,
//! archive retrieval and service metadata.

use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use crosspost_core::adapters::bbc::detect_bbc_section;
use crosspost_common::SiteType;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

const MAX_SUGGESTIONS: usize = 15;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub crawl_id: String,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "cancel".to_string()
}

/// One-shot out-of-band cancellation. Unknown ids still return success;
/// the session may have finished on its own a moment earlier.
pub async fn cancel_crawl(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CancelRequest>,
) -> Response {
    if request.crawl_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "crawl_id is required"})),
        )
            .into_response();
    }

    let known = state.cancel_session(&request.crawl_id).await;
    tracing::info!(crawl_id = %request.crawl_id, known, action = %request.action, "cancel requested");

    Json(json!({
        "success": true,
        "crawl_id": request.crawl_id,
        "timestamp": chrono::Utc::now().timestamp(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub keyword: String,
}

const REDDIT_SUGGESTIONS: &[&str] = &[
    "askreddit",
    "todayilearned",
    "funny",
    "pics",
    "worldnews",
    "gaming",
    "technology",
    "programming",
    "korea",
];

const LEMMY_SUGGESTIONS: &[&str] = &[
    "technology@lemmy.world",
    "asklemmy@lemmy.ml",
    "worldnews@lemmy.ml",
    "programming@programming.dev",
];

const FOURCHAN_SUGGESTIONS: &[&str] = &["g", "a", "v", "mu", "fit", "ck", "tv", "sci"];

/// Board-name suggestions: lookup tables where they exist, URL detection
/// for BBC, small static lists otherwise.
pub async fn autocomplete(
    State(state): State<Arc<AppState>>,
    Path(site): Path<String>,
    Query(query): Query<AutocompleteQuery>,
) -> Response {
    let keyword = query.keyword.trim().to_lowercase();
    let Ok(site) = SiteType::from_str(&site) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown site: {site}")})),
        )
            .into_response();
    };

    if site == SiteType::Bbc && (keyword.contains("bbc") || keyword.starts_with("http")) {
        if let Some(section) = detect_bbc_section(&keyword) {
            return Json(json!({
                "matches": [section.display_name],
                "detected_site": "bbc",
                "auto_detected": true,
            }))
            .into_response();
        }
    }

    let matches: Vec<String> = match site {
        SiteType::Dcinside => state.tables.gallery_suggestions(&keyword, MAX_SUGGESTIONS),
        SiteType::Blind => state.tables.topic_suggestions(&keyword, MAX_SUGGESTIONS),
        SiteType::Reddit => static_matches(REDDIT_SUGGESTIONS, &keyword),
        SiteType::Lemmy => static_matches(LEMMY_SUGGESTIONS, &keyword),
        SiteType::FourChan => static_matches(FOURCHAN_SUGGESTIONS, &keyword),
        _ => Vec::new(),
    };

    Json(json!({"matches": matches, "auto_detected": false})).into_response()
}

fn static_matches(candidates: &[&str], keyword: &str) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| c.contains(keyword))
        .take(MAX_SUGGESTIONS)
        .map(|c| c.to_string())
        .collect()
}

/// Serve a packaged media archive. 404 once the TTL sweep has removed it.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let Some(path) = state.packager.archive_path(&name) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "archive not found"}))).into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(archive = %name, error = %err, "archive read failed");
            (StatusCode::NOT_FOUND, Json(json!({"error": "archive not found"}))).into_response()
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "healthy",
        "environment": state.config.app_env,
        "supported_sites": state.registry.supported_sites(),
    }))
    .into_response()
}

pub async fn root() -> Response {
    Json(json!({
        "message": "crosspost API server",
        "status": "running",
        "session_endpoint": "/ws/crawl",
    }))
    .into_response()
}

pub async fn system_info(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.app_env,
        "supported_sites": state.registry.supported_sites(),
        "endpoints": {
            "session": "/ws/crawl",
            "cancel": "/api/cancel-crawl",
            "autocomplete": "/autocomplete/{site}",
            "media": "/api/download-file/{name}",
        },
        "features": {
            "translation": state.deepl.is_some(),
            "media_packaging": true,
            "cancellation": true,
            "parameter_filtering": true,
        },
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_suggestion_matching() {
        let matches = static_matches(REDDIT_SUGGESTIONS, "pro");
        assert_eq!(matches, vec!["programming"]);
        assert!(static_matches(LEMMY_SUGGESTIONS, "tech")
            .iter()
            .all(|m| m.contains('@')));
        assert!(static_matches(REDDIT_SUGGESTIONS, "").len() <= MAX_SUGGESTIONS);
    }
}
