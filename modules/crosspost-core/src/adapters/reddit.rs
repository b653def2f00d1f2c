//! Reddit crawler.
//!
//! Listings come from the JSON API. With client credentials configured the
//! adapter authenticates via OAuth2 client-credentials and reads from
//! `oauth.reddit.com`; without them it falls back to the public `.json`
//! endpoints. The client object is constructed once at registry build and
//! handed to the adapter; there is no process-global handle.

use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType, SortOrder, TimeFilter};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const AUTH_BASE: &str = "https://www.reddit.com";
const API_BASE: &str = "https://oauth.reddit.com";
const PUBLIC_BASE: &str = "https://www.reddit.com";
const CANONICAL_BASE: &str = "https://reddit.com";

/// Listing page size; the API caps at 100.
const LISTING_LIMIT: usize = 100;

/// Over-fetch ceiling when compensating for filter rejections.
const MAX_FETCH: usize = 2000;

/// Hosts whose URLs are media as-is, no preview lookup needed.
const MEDIA_HOSTS: &[&str] =
    &["i.redd.it", "v.redd.it", "i.imgur.com", "imgur.com", "gfycat.com", "streamable.com"];

pub struct RedditClient {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: String,
    auth_base: String,
    api_base: String,
    public_base: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl RedditClient {
    pub fn new(
        http: reqwest::Client,
        client_id: Option<String>,
        client_secret: Option<String>,
        user_agent: String,
    ) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            user_agent,
            auth_base: AUTH_BASE.to_string(),
            api_base: API_BASE.to_string(),
            public_base: PUBLIC_BASE.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Redirect every endpoint at one host. Used by tests.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.auth_base = base.clone();
        self.api_base = base.clone();
        self.public_base = base;
        self
    }

    fn is_authenticated(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Client-credentials token, cached until shortly before expiry.
    async fn token(&self) -> CrawlResult<String> {
        let (id, secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => {
                return Err(CrawlError::Auth { detail: "Reddit credentials not configured".into() })
            }
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/api/v1/access_token", self.auth_base);
        let response = self
            .http
            .post(&url)
            .basic_auth(id, Some(secret))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Auth {
                detail: format!("token request failed with status {status}"),
            });
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| CrawlError::Auth { detail: "malformed token response".into() })?;

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60)),
        });
        Ok(value)
    }

    /// One listing page for a subreddit.
    pub async fn listing(
        &self,
        subreddit: &str,
        sort: &str,
        time_window: Option<&str>,
        limit: usize,
        after: Option<&str>,
    ) -> CrawlResult<Listing> {
        let base = if self.is_authenticated() { &self.api_base } else { &self.public_base };
        let mut url = format!("{base}/r/{subreddit}/{sort}.json?raw_json=1&limit={limit}");
        if let Some(t) = time_window {
            url.push_str(&format!("&t={t}"));
        }
        if let Some(after) = after {
            url.push_str(&format!("&after={after}"));
        }

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(super::FETCH_TIMEOUT);
        if self.is_authenticated() {
            request = request.bearer_auth(self.token().await?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        match response.status() {
            status if status.is_success() => {}
            reqwest::StatusCode::UNAUTHORIZED => {
                return Err(CrawlError::Auth { detail: "listing request unauthorized".into() })
            }
            reqwest::StatusCode::FORBIDDEN => {
                return Err(CrawlError::BoardNotFound {
                    input: format!("r/{subreddit} (private or quarantined)"),
                })
            }
            reqwest::StatusCode::NOT_FOUND => {
                return Err(CrawlError::BoardNotFound { input: format!("r/{subreddit}") })
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(CrawlError::RateLimited),
            status => {
                return Err(CrawlError::Http(
                    format!("listing request failed with status {status}").into(),
                ))
            }
        }

        response
            .json()
            .await
            .map_err(|e| CrawlError::Parse { detail: e.to_string() })
    }
}

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: RedditPost,
}

#[derive(Debug, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub permalink: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub author: Option<String>,
    pub created_utc: f64,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub preview: Option<Preview>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, MediaMeta>>,
    #[serde(default)]
    pub secure_media: Option<SecureMedia>,
}

#[derive(Debug, Deserialize)]
pub struct Preview {
    #[serde(default)]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewImage {
    pub source: PreviewSource,
}

#[derive(Debug, Deserialize)]
pub struct PreviewSource {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaMeta {
    #[serde(default)]
    pub s: Option<MediaSource>,
}

#[derive(Debug, Deserialize)]
pub struct MediaSource {
    #[serde(default)]
    pub u: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SecureMedia {
    #[serde(default)]
    pub reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
pub struct RedditVideo {
    pub fallback_url: String,
}

impl RedditPost {
    /// Layered media extraction: a direct media-host URL wins, then the
    /// preview source, then gallery metadata, then the hosted-video
    /// fallback URL.
    fn extract_media(&self) -> Option<String> {
        if let Some(url) = &self.url {
            let host = crosspost_common::extract_domain(url);
            if MEDIA_HOSTS.iter().any(|h| host == *h) || crosspost_common::has_image_extension(url)
            {
                return Some(url.clone());
            }
        }
        if let Some(source) = self
            .preview
            .as_ref()
            .and_then(|p| p.images.first())
            .map(|i| &i.source.url)
        {
            return Some(unescape_amp(source));
        }
        if let Some(meta) = self.media_metadata.as_ref() {
            if let Some(url) = meta.values().find_map(|m| m.s.as_ref().and_then(|s| s.u.clone())) {
                return Some(unescape_amp(&url));
            }
        }
        if let Some(video) = self.secure_media.as_ref().and_then(|m| m.reddit_video.as_ref()) {
            return Some(video.fallback_url.clone());
        }
        None
    }

    fn into_record(self, subreddit: &str) -> PostRecord {
        let reddit_url = format!("{CANONICAL_BASE}{}", self.permalink);
        let created = DateTime::<Utc>::from_timestamp(self.created_utc as i64, 0);
        let author = self.author.clone().unwrap_or_else(|| "[deleted]".to_string());
        let media = self.extract_media();

        let mut record = PostRecord::new(SiteType::Reddit, subreddit, self.title.clone(), reddit_url.clone())
            .with_metrics(0, self.score.max(0) as u64, self.num_comments)
            .with_created_at(
                created.map(crate::dates::format_post_date).unwrap_or_default(),
                created,
            )
            .with_author(author)
            .with_extra("post_id", self.id.clone())
            .with_extra("nsfw", self.over_18)
            .with_extra("stickied", self.stickied);

        if let Some(flair) = &self.link_flair_text {
            record = record.with_extra("flair", flair.clone());
        }
        if let Some(ratio) = self.upvote_ratio {
            record = record.with_extra("upvote_ratio", ratio);
        }
        if let Some(thumbnail) = self.thumbnail.as_ref().filter(|t| t.starts_with("http")) {
            record = record.with_thumbnail(unescape_amp(thumbnail));
        }
        if let Some(media) = media {
            record = record.with_media(media);
        }
        if let Some(url) = &self.url {
            if url.starts_with("http") && !url.starts_with(CANONICAL_BASE) && *url != reddit_url {
                record = record.with_external_url(url.clone());
            }
        }
        record
    }
}

/// Reddit's `raw_json=0` responses HTML-escape ampersands inside URLs.
fn unescape_amp(url: &str) -> String {
    url.replace("&amp;", "&")
}

pub struct RedditAdapter {
    client: Arc<RedditClient>,
}

impl RedditAdapter {
    pub fn new(client: Arc<RedditClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for RedditAdapter {
    fn site(&self) -> SiteType {
        SiteType::Reddit
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let subreddit = target.trim().trim_matches('/').to_string();

        let has_metric_filters =
            options.min_views > 0 || options.min_likes > 0 || options.min_comments > 0;
        let budget = if options.enforce_date_limit && options.has_date_filter() {
            MAX_FETCH
        } else if has_metric_filters {
            (options.end_index * 3).min(MAX_FETCH)
        } else {
            options.end_index + 10
        };

        let sort = native_sort(options.sort);
        let time_window = if sort == "top" {
            Some(if options.enforce_date_limit {
                "all"
            } else {
                time_token(options.time_filter)
            })
        } else {
            None
        };

        let source = RedditSource {
            client: self.client.clone(),
            subreddit,
            sort,
            time_window,
            budget,
            cursor: Mutex::new(None),
            exhausted: AtomicBool::new(false),
            served: AtomicUsize::new(0),
        };
        run_crawl(&source, options, sink, cancel).await
    }
}

fn native_sort(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Hot | SortOrder::Popular => "hot",
        SortOrder::New | SortOrder::Recent => "new",
        SortOrder::Rising => "rising",
        SortOrder::Best => "best",
        SortOrder::Top | SortOrder::Recommend | SortOrder::Comments => "top",
    }
}

fn time_token(filter: TimeFilter) -> &'static str {
    match filter {
        TimeFilter::Hour => "hour",
        TimeFilter::Day => "day",
        TimeFilter::Week => "week",
        TimeFilter::Month => "month",
        TimeFilter::Year => "year",
        TimeFilter::All | TimeFilter::Custom => "all",
    }
}

struct RedditSource {
    client: Arc<RedditClient>,
    subreddit: String,
    sort: &'static str,
    time_window: Option<&'static str>,
    budget: usize,
    cursor: Mutex<Option<String>>,
    exhausted: AtomicBool,
    served: AtomicUsize,
}

#[async_trait]
impl PageSource for RedditSource {
    fn site(&self) -> SiteType {
        SiteType::Reddit
    }

    fn board(&self) -> &str {
        &self.subreddit
    }

    fn page_size(&self) -> usize {
        LISTING_LIMIT
    }

    // Cursor pagination is inherently sequential.
    fn max_in_flight(&self) -> usize {
        1
    }

    async fn fetch_page(&self, _page: u32) -> CrawlResult<Vec<PostRecord>> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let served = self.served.load(Ordering::SeqCst);
        if served >= self.budget {
            return Ok(Vec::new());
        }
        let limit = LISTING_LIMIT.min(self.budget - served);

        let mut cursor = self.cursor.lock().await;
        let listing = self
            .client
            .listing(&self.subreddit, self.sort, self.time_window, limit, cursor.as_deref())
            .await?;

        *cursor = listing.data.after.clone();
        if cursor.is_none() {
            self.exhausted.store(true, Ordering::SeqCst);
        }

        let posts: Vec<PostRecord> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into_record(&self.subreddit))
            .collect();
        self.served.fetch_add(posts.len(), Ordering::SeqCst);
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_json(n: u32, score: i64) -> serde_json::Value {
        serde_json::json!({"data": {
            "id": format!("id{n}"),
            "title": format!("Post number {n}"),
            "permalink": format!("/r/rust/comments/id{n}/post/"),
            "url": format!("https://reddit.com/r/rust/comments/id{n}/post/"),
            "score": score,
            "num_comments": 7,
            "author": "author",
            "created_utc": 1722300000.0,
            "thumbnail": "self",
            "over_18": false,
            "stickied": false
        }})
    }

    #[test]
    fn media_extraction_layers() {
        // Direct media host wins.
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "a", "title": "t", "permalink": "/r/pics/comments/a/",
            "url": "https://i.redd.it/abc.jpg", "created_utc": 1722300000.0
        }))
        .unwrap();
        assert_eq!(post.extract_media().as_deref(), Some("https://i.redd.it/abc.jpg"));

        // Preview source with escaped ampersands.
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "b", "title": "t", "permalink": "/r/pics/comments/b/",
            "url": "https://example.com/article",
            "preview": {"images": [{"source": {"url": "https://preview.redd.it/x.jpg?width=640&amp;s=abc"}}]},
            "created_utc": 1722300000.0
        }))
        .unwrap();
        assert_eq!(
            post.extract_media().as_deref(),
            Some("https://preview.redd.it/x.jpg?width=640&s=abc")
        );

        // Gallery metadata.
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "c", "title": "t", "permalink": "/r/pics/comments/c/",
            "media_metadata": {"m1": {"s": {"u": "https://preview.redd.it/g.jpg?a=1&amp;b=2"}}},
            "created_utc": 1722300000.0
        }))
        .unwrap();
        assert_eq!(post.extract_media().as_deref(), Some("https://preview.redd.it/g.jpg?a=1&b=2"));

        // Hosted video fallback.
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "d", "title": "t", "permalink": "/r/videos/comments/d/",
            "secure_media": {"reddit_video": {"fallback_url": "https://v.redd.it/d/DASH_720.mp4"}},
            "created_utc": 1722300000.0
        }))
        .unwrap();
        assert_eq!(post.extract_media().as_deref(), Some("https://v.redd.it/d/DASH_720.mp4"));
    }

    #[test]
    fn image_media_backfills_thumbnail() {
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "a", "title": "t", "permalink": "/r/pics/comments/a/",
            "url": "https://i.redd.it/abc.jpg", "created_utc": 1722300000.0
        }))
        .unwrap();
        let record = post.into_record("pics");
        assert_eq!(record.thumbnail_url.as_deref(), Some("https://i.redd.it/abc.jpg"));
        assert!(record.link.starts_with("https://reddit.com/r/pics/"));
    }

    #[test]
    fn external_links_are_carried_separately() {
        let post: RedditPost = serde_json::from_value(serde_json::json!({
            "id": "a", "title": "t", "permalink": "/r/programming/comments/a/",
            "url": "https://example.com/article", "created_utc": 1722300000.0
        }))
        .unwrap();
        let record = post.into_record("programming");
        assert_eq!(record.external_url.as_deref(), Some("https://example.com/article"));
    }

    #[tokio::test]
    async fn unauthenticated_listing_uses_public_endpoint() {
        let server = MockServer::start().await;
        let children: Vec<serde_json::Value> = (1..=30).map(|n| post_json(n, 100)).collect();
        Mock::given(method("GET"))
            .and(path("/r/rust/top.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"after": null, "children": children}
            })))
            .mount(&server)
            .await;

        let client = Arc::new(
            RedditClient::new(reqwest::Client::new(), None, None, "test-agent".into())
                .with_base_url(server.uri()),
        );
        let adapter = RedditAdapter::new(client);
        let options = CrawlOptions {
            sort: SortOrder::Top,
            start_index: 1,
            end_index: 5,
            time_filter: TimeFilter::All,
            ..Default::default()
        };
        let posts = adapter
            .fetch("rust", &options, &ProgressSink::discard(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(posts.len(), 5);
        assert_eq!(posts.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(posts.iter().all(|p| p.score > 0 || p.comments > 0));
    }

    #[tokio::test]
    async fn missing_subreddit_fails_the_crawl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/doesnotexist/top.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Arc::new(
            RedditClient::new(reqwest::Client::new(), None, None, "test-agent".into())
                .with_base_url(server.uri()),
        );
        let adapter = RedditAdapter::new(client);
        let options = CrawlOptions {
            sort: SortOrder::Top,
            time_filter: TimeFilter::All,
            ..Default::default()
        };
        let err = adapter
            .fetch("doesnotexist", &options, &ProgressSink::discard(), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::BoardNotFound { .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = Arc::new(
            RedditClient::new(
                reqwest::Client::new(),
                Some("id".into()),
                Some("secret".into()),
                "test-agent".into(),
            )
            .with_base_url(server.uri()),
        );
        let adapter = RedditAdapter::new(client);
        let err = adapter
            .fetch("rust", &CrawlOptions::default(), &ProgressSink::discard(), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Auth { .. }));
    }
}
