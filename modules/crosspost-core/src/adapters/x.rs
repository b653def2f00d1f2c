//! X (Twitter) crawler.
//!
//! No stable public API remains, so this adapter works two angles: user
//! timelines come from the embed syndication endpoint (server-rendered HTML
//! with the timeline JSON embedded), hashtag and keyword queries fall back
//! to scraping the public search page. Both are best-effort; posts the
//! markup does not expose simply do not appear.

use super::{BROWSER_USER_AGENT, FETCH_TIMEOUT};
use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType};
use scraper::{Html, Selector};

const SYNDICATION_BASE: &str = "https://syndication.twitter.com";
const WEB_BASE: &str = "https://x.com";

pub struct XAdapter {
    client: reqwest::Client,
}

impl XAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for XAdapter {
    fn site(&self) -> SiteType {
        SiteType::X
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let query = parse_target(target)?;
        let source = XSource {
            client: self.client.clone(),
            query,
            board: target.to_string(),
            min_retweets: options.min_retweets,
            include_nsfw: options.include_nsfw,
        };
        run_crawl(&source, options, sink, cancel).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum XQuery {
    Timeline(String),
    Search(String),
}

fn parse_target(target: &str) -> CrawlResult<XQuery> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::InvalidParameters { detail: "handle or query required".into() });
    }
    if let Some(handle) = trimmed.strip_prefix('@') {
        return Ok(XQuery::Timeline(handle.to_string()));
    }
    if let Some(tag) = trimmed.strip_prefix('#') {
        return Ok(XQuery::Search(format!("#{tag}")));
    }
    Ok(XQuery::Search(trimmed.to_string()))
}

struct XSource {
    client: reqwest::Client,
    query: XQuery,
    board: String,
    min_retweets: u64,
    include_nsfw: bool,
}

#[async_trait]
impl PageSource for XSource {
    fn site(&self) -> SiteType {
        SiteType::X
    }

    fn board(&self) -> &str {
        &self.board
    }

    fn page_size(&self) -> usize {
        50
    }

    fn progress_floor(&self) -> u8 {
        35
    }

    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        if page > 1 {
            return Ok(Vec::new());
        }

        let posts = match &self.query {
            XQuery::Timeline(handle) => self.fetch_timeline(handle).await?,
            XQuery::Search(query) => self.fetch_search(query).await?,
        };

        Ok(posts
            .into_iter()
            .filter(|post| {
                let retweets = post
                    .extras
                    .get("retweets")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                retweets >= self.min_retweets
            })
            .filter(|post| {
                self.include_nsfw
                    || !post
                        .extras
                        .get("possibly_sensitive")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false)
            })
            .collect())
    }
}

impl XSource {
    async fn fetch_timeline(&self, handle: &str) -> CrawlResult<Vec<PostRecord>> {
        let url = format!("{SYNDICATION_BASE}/srv/timeline-profile/screen-name/{handle}");
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CrawlError::BoardNotFound { input: format!("@{handle}") });
        }
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        let Some(payload) = embedded_timeline_json(&body) else {
            return Ok(Vec::new());
        };
        Ok(timeline_records(&payload, handle, &self.board))
    }

    /// The search page is JS-rendered for real browsers; whatever anchors
    /// survive in the static HTML are extracted the generic way.
    async fn fetch_search(&self, query: &str) -> CrawlResult<Vec<PostRecord>> {
        let url = format!(
            "{WEB_BASE}/search?q={}&f=live",
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
        );
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        Ok(search_records(&body, &self.board))
    }
}

/// Pull the `__NEXT_DATA__` JSON blob out of a syndication page.
fn embedded_timeline_json(html: &str) -> Option<serde_json::Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[id="__NEXT_DATA__"]"#).unwrap();
    let script = document.select(&selector).next()?;
    let raw = script.text().collect::<String>();
    serde_json::from_str(&raw).ok()
}

fn timeline_records(payload: &serde_json::Value, handle: &str, board: &str) -> Vec<PostRecord> {
    let entries = payload
        .pointer("/props/pageProps/timeline/entries")
        .and_then(|v| v.as_array());
    let Some(entries) = entries else { return Vec::new() };

    entries
        .iter()
        .filter_map(|entry| {
            let tweet = entry.pointer("/content/tweet")?;
            let id = tweet.get("id_str")?.as_str()?;
            let text = tweet
                .get("full_text")
                .or_else(|| tweet.get("text"))?
                .as_str()?
                .trim()
                .to_string();
            if text.is_empty() {
                return None;
            }

            let user = tweet
                .pointer("/user/screen_name")
                .and_then(|v| v.as_str())
                .unwrap_or(handle);
            let likes = tweet.get("favorite_count").and_then(|v| v.as_u64()).unwrap_or(0);
            let replies = tweet.get("reply_count").and_then(|v| v.as_u64()).unwrap_or(0);
            let retweets = tweet.get("retweet_count").and_then(|v| v.as_u64()).unwrap_or(0);
            let views = tweet
                .pointer("/ext_views/count")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let created_raw = tweet.get("created_at").and_then(|v| v.as_str()).unwrap_or("");
            let created = parse_twitter_date(created_raw);

            let title: String = text.chars().take(140).collect();
            let mut record = PostRecord::new(
                SiteType::X,
                board,
                title,
                format!("{WEB_BASE}/{user}/status/{id}"),
            )
            .with_body(text)
            .with_metrics(views, likes, replies)
            .with_created_at(created_raw.to_string(), created)
            .with_author(format!("@{user}"))
            .with_extra("retweets", retweets);

            if let Some(sensitive) = tweet.get("possibly_sensitive").and_then(|v| v.as_bool()) {
                record = record.with_extra("possibly_sensitive", sensitive);
            }
            if let Some(media) = tweet
                .pointer("/entities/media/0/media_url_https")
                .and_then(|v| v.as_str())
            {
                record = record.with_media(media.to_string());
            }
            Some(record)
        })
        .collect()
}

fn search_records(html: &str, board: &str) -> Vec<PostRecord> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"a[href*="/status/"]"#).unwrap();

    let mut seen = std::collections::HashSet::new();
    let mut posts = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let link = super::absolutize(href, WEB_BASE);
        if !seen.insert(link.clone()) {
            continue;
        }
        let text = anchor.text().collect::<String>().trim().to_string();
        if text.chars().count() < 5 {
            continue;
        }
        posts.push(PostRecord::new(SiteType::X, board, text, link));
    }
    posts
}

/// `Wed Oct 10 20:19:24 +0000 2018`
fn parse_twitter_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
