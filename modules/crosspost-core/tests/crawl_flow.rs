//! End-to-end flow over detector → dispatcher → adapter → engine, with the
//! network mocked out.

use crosspost_common::{CancelFlag, Config, ProgressSink, ServerMessage, SiteType};
use crosspost_core::{build_registry, BoardTables, CrawlError, SiteDetector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> Config {
    Config {
        app_env: "test".to_string(),
        port: 0,
        log_level: "warn".to_string(),
        deepl_api_key: None,
        reddit_client_id: None,
        reddit_client_secret: None,
        reddit_user_agent: "crosspost-tests".to_string(),
        allowed_origins: Vec::new(),
        data_dir: "does-not-exist".into(),
        media_dir: std::env::temp_dir(),
    }
}

fn raw(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

const FORUM_PAGE: &str = r#"
    <html><body>
      <h2><a href="/threads/alpha">Alpha discussion thread</a></h2>
      <h2><a href="/threads/beta">Beta release announcement</a></h2>
      <h3><a href="/threads/gamma">Gamma benchmark results</a></h3>
      <h3><a href="/threads/delta">Delta question megathread</a></h3>
      <h3><a href="/threads/epsilon">Epsilon weekly roundup</a></h3>
      <h3><a href="/threads/zeta">Zeta follow-up discussion</a></h3>
      <h2><a href="/more">More</a></h2>
    </body></html>
"#;

#[tokio::test]
async fn unknown_domain_crawls_via_universal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forum"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORUM_PAGE))
        .mount(&server)
        .await;

    let detector = SiteDetector::new();
    let input = format!("{}/forum", server.uri());
    let site = detector.detect(&input).await;
    assert_eq!(site, SiteType::Universal);
    let identifier = detector.extract_board_identifier(&input, site);

    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    let posts = registry
        .dispatch(
            site,
            &identifier,
            raw(&[("start", json!(1)), ("end", json!(5)), ("time_filter", json!("all"))]),
            &ProgressSink::discard(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(posts.len(), 5);
    assert_eq!(posts.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert!(posts.iter().all(|p| !p.link.is_empty()));
    assert!(posts.iter().all(|p| p.title_original != "More"));
}

#[tokio::test]
async fn metric_floor_filters_metricless_pages_to_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forum"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORUM_PAGE))
        .mount(&server)
        .await;

    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    let posts = registry
        .dispatch(
            SiteType::Universal,
            &format!("{}/forum", server.uri()),
            raw(&[
                ("start", json!(1)),
                ("end", json!(5)),
                ("min_views", json!(10)),
                ("time_filter", json!("all")),
            ]),
            &ProgressSink::discard(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    // Generic pages expose no metrics, so a views floor rejects everything.
    assert!(posts.is_empty());
}

#[tokio::test]
async fn overwide_rank_range_is_rejected_before_any_fetch() {
    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    let err = registry
        .dispatch(
            SiteType::Universal,
            "https://example.com/forum",
            raw(&[("start", json!(1)), ("end", json!(102))]),
            &ProgressSink::discard(),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::InvalidParameters { .. }));
}

#[tokio::test]
async fn gallery_resolution_miss_fails_the_crawl() {
    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    let err = registry
        .dispatch(
            SiteType::Dcinside,
            "존재하지않는갤러리",
            raw(&[]),
            &ProgressSink::discard(),
            &CancelFlag::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::BoardNotFound { .. }));
}

#[tokio::test]
async fn cancelled_session_unwinds_without_fetching() {
    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = registry
        .dispatch(
            SiteType::Universal,
            "https://example.invalid/forum",
            raw(&[("time_filter", json!("all"))]),
            &ProgressSink::discard(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Cancelled));
}

#[tokio::test]
async fn progress_frames_are_monotone_with_single_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forum"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORUM_PAGE))
        .mount(&server)
        .await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = ProgressSink::new(tx);
    let registry = build_registry(reqwest::Client::new(), &test_config(), Arc::new(BoardTables::empty()));
    registry
        .dispatch(
            SiteType::Universal,
            &format!("{}/forum", server.uri()),
            raw(&[("start", json!(1)), ("end", json!(3)), ("time_filter", json!("all"))]),
            &sink,
            &CancelFlag::new(),
        )
        .await
        .unwrap();
    drop(sink);

    let mut last = 0u8;
    while let Ok(frame) = rx.try_recv() {
        if let ServerMessage::Progress { progress, .. } = frame {
            assert!(progress <= 100);
            assert!(progress >= last);
            last = progress;
        }
    }
}
