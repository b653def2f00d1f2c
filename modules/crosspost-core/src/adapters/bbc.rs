//! BBC section crawler.
//!
//! Sections are addressed by URL or bare path (`news`, `sport`,
//! `news/technology`); an empty board falls back to the front news section.
//! The section's RSS feed is the primary source because it carries publish
//! dates; the HTML page is scraped only when the feed yields nothing.

use super::{BROWSER_USER_AGENT, FETCH_TIMEOUT};
use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType};
use scraper::{Html, Selector};
use std::collections::HashSet;

const WEB_BASE: &str = "https://www.bbc.com";
const FEED_BASE: &str = "https://feeds.bbci.co.uk";

/// Parsed section info, also used by the autocomplete endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BbcSection {
    /// Path without leading slash, e.g. `news/technology`.
    pub path: String,
    /// Human-facing name, e.g. `BBC News Technology`.
    pub display_name: String,
}

impl BbcSection {
    pub fn feed_url(&self) -> String {
        format!("{FEED_BASE}/{}/rss.xml", self.path)
    }

    pub fn page_url(&self) -> String {
        format!("{WEB_BASE}/{}", self.path)
    }
}

/// Top-level sections a bare keyword may select; anything else defaults to
/// the front news section.
const KNOWN_SECTIONS: &[&str] = &[
    "news", "sport", "business", "innovation", "culture", "arts", "travel", "future-planet",
    "technology", "science_and_environment", "entertainment_and_arts", "worklife",
];

/// Recognize a BBC URL or bare section path and name it. Returns `None` for
/// URLs that clearly point elsewhere.
pub fn detect_bbc_section(input: &str) -> Option<BbcSection> {
    let trimmed = input.trim();
    let path = if trimmed.is_empty() {
        "news".to_string()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let domain = crosspost_common::extract_domain(trimmed);
        if !(domain == "bbc.com" || domain == "bbc.co.uk" || domain.ends_with(".bbc.com") || domain.ends_with(".bbc.co.uk")) {
            return None;
        }
        let url = url::Url::parse(trimmed).ok()?;
        let path = url.path().trim_matches('/');
        if path.is_empty() {
            "news".to_string()
        } else {
            path.to_string()
        }
    } else {
        // Keyword form: drop the site name itself, keep a known section.
        let bare = trimmed
            .trim_matches('/')
            .to_lowercase()
            .replace("bbc", "")
            .trim_matches([' ', '/'])
            .to_string();
        if bare.is_empty() {
            "news".to_string()
        } else if KNOWN_SECTIONS.contains(&bare.split('/').next().unwrap_or_default()) {
            bare
        } else {
            "news".to_string()
        }
    };

    let display_name = std::iter::once("BBC".to_string())
        .chain(path.split('/').map(capitalize))
        .collect::<Vec<_>>()
        .join(" ");

    Some(BbcSection { path, display_name })
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct BbcAdapter {
    client: reqwest::Client,
}

impl BbcAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for BbcAdapter {
    fn site(&self) -> SiteType {
        SiteType::Bbc
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let section = detect_bbc_section(target).ok_or_else(|| CrawlError::InvalidUrl {
            url: target.to_string(),
        })?;

        let source = BbcSource { client: self.client.clone(), section };
        run_crawl(&source, options, sink, cancel).await
    }
}

struct BbcSource {
    client: reqwest::Client,
    section: BbcSection,
}

#[async_trait]
impl PageSource for BbcSource {
    fn site(&self) -> SiteType {
        SiteType::Bbc
    }

    fn board(&self) -> &str {
        &self.section.display_name
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

        match self.fetch_feed().await {
            Ok(posts) if !posts.is_empty() => return Ok(posts),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(section = %self.section.path, error = %err, "RSS fetch failed, falling back to HTML");
            }
        }
        self.fetch_html().await
    }
}

impl BbcSource {
    async fn fetch_feed(&self) -> CrawlResult<Vec<PostRecord>> {
        let url = self.section.feed_url();
        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;
        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        let feed = feed_rs::parser::parse(bytes.as_ref())
            .map_err(|e| CrawlError::Parse { detail: e.to_string() })?;

        let board = self.section.display_name.clone();
        let posts = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let title = entry.title.as_ref().map(|t| t.content.trim().to_string())?;
                let link = entry.links.first().map(|l| l.href.clone())?;
                if title.is_empty() || link.is_empty() {
                    return None;
                }

                let published = entry.published.or(entry.updated);
                let mut post = PostRecord::new(SiteType::Bbc, &board, title, link)
                    .with_created_at(
                        published.map(crate::dates::format_post_date).unwrap_or_default(),
                        published,
                    );
                if let Some(summary) = entry.summary {
                    post = post.with_body(summary.content.trim().to_string());
                }
                if let Some(thumbnail) = entry
                    .media
                    .iter()
                    .flat_map(|m| m.thumbnails.iter())
                    .next()
                {
                    post = post.with_thumbnail(thumbnail.image.uri.clone());
                }
                Some(post)
            })
            .collect();
        Ok(posts)
    }

    async fn fetch_html(&self) -> CrawlResult<Vec<PostRecord>> {
        let url = self.section.page_url();
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
        Ok(parse_section_page(&body, &self.section))
    }
}

/// Headline anchors on a section front page.
const HEADLINE_SELECTORS: &[&str] = &[
    "a.gs-c-promo-heading",
    r#"[data-testid="internal-link"] h2"#,
    "h3 a, h2 a",
];

fn parse_section_page(html: &str, section: &BbcSection) -> Vec<PostRecord> {
    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut posts = Vec::new();

    for raw in HEADLINE_SELECTORS {
        let selector = Selector::parse(raw).unwrap();
        for element in document.select(&selector) {
            // The anchor is either the element itself or its nearest ancestor.
            let anchor = if element.value().name() == "a" {
                Some(element)
            } else {
                element
                    .ancestors()
                    .filter_map(scraper::ElementRef::wrap)
                    .find(|el| el.value().name() == "a")
            };
            let Some(anchor) = anchor else { continue };
            let Some(href) = anchor.value().attr("href") else { continue };

            let link = super::absolutize(href, WEB_BASE);
            if !seen.insert(link.clone()) {
                continue;
            }
            let title = element.text().collect::<String>().trim().to_string();
            if title.chars().count() < 5 {
                continue;
            }
            posts.push(PostRecord::new(SiteType::Bbc, &section.display_name, title, link));
        }
        if !posts.is_empty() {
            break;
        }
    }
    posts
}
