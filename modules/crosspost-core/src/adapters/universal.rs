//! Best-effort generic crawler for sites without a dedicated adapter.
//!
//! Fetches the given URL once, enumerates anchors through a prioritized
//! selector list, deduplicates by href and filters boilerplate link text.
//! Metrics stay at zero; the engine still owns filtering and slicing.

use super::{BROWSER_USER_AGENT, FETCH_TIMEOUT};
use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use crosspost_common::{extract_domain, CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType};
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Anchor selectors in priority order: explicit headline markup first,
/// class-name conventions after.
const SELECTOR_TIERS: &[&str] = &[
    "h1 a, h2 a, h3 a, h4 a",
    ".title a, .headline a, .article-title a",
    r#"[class*="title"] a, [class*="headline"] a"#,
];

/// Link texts that are navigation chrome, not posts.
const BOILERPLATE: &[&str] = &[
    "more", "read more", "click here", "home", "menu", "next", "prev", "previous",
    "더보기", "클릭", "홈", "메뉴", "다음", "이전",
];

const MIN_TITLE_LEN: usize = 5;
const MAX_LINKS: usize = 200;

pub struct UniversalAdapter {
    client: reqwest::Client,
}

impl UniversalAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for UniversalAdapter {
    fn site(&self) -> SiteType {
        SiteType::Universal
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let url = normalize_url(target)?;
        let board = extract_domain(&url);
        let source = UniversalSource { client: self.client.clone(), url, board };
        run_crawl(&source, options, sink, cancel).await
    }
}

struct UniversalSource {
    client: reqwest::Client,
    url: String,
    board: String,
}

#[async_trait]
impl PageSource for UniversalSource {
    fn site(&self) -> SiteType {
        SiteType::Universal
    }

    fn board(&self) -> &str {
        &self.board
    }

    fn page_size(&self) -> usize {
        100
    }

    fn progress_floor(&self) -> u8 {
        40
    }

    /// Generic pages have no pagination contract; everything comes from the
    /// first fetch.
    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        if page > 1 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &self.url))?;

        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::from_request(e, &self.url))?;

        Ok(extract_posts(&body, &self.url, &self.board))
    }
}

fn normalize_url(target: &str) -> CrawlResult<String> {
    let trimmed = target.trim();
    let candidate = if trimmed.is_empty() {
        return Err(CrawlError::InvalidUrl { url: target.to_string() });
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    url::Url::parse(&candidate)
        .map_err(|_| CrawlError::InvalidUrl { url: target.to_string() })?;
    Ok(candidate)
}

fn is_boilerplate(title: &str) -> bool {
    let lower = title.to_lowercase();
    BOILERPLATE.iter().any(|pattern| lower == *pattern || lower.starts_with(&format!("{pattern} ")))
}

/// Enumerate candidate anchors tier by tier, dedup by resolved href.
fn extract_posts(html: &str, base_url: &str, board: &str) -> Vec<PostRecord> {
    let base = match url::Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);

    let mut seen: HashSet<String> = HashSet::new();
    let mut posts = Vec::new();

    for tier in SELECTOR_TIERS {
        let selector = Selector::parse(tier).unwrap();
        for anchor in document.select(&selector) {
            let Some(href) = anchor.value().attr("href").map(str::trim) else { continue };
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                continue;
            }
            let Ok(resolved) = base.join(href) else { continue };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            let link = resolved.to_string();
            if !seen.insert(link.clone()) {
                continue;
            }

            let title = anchor.text().collect::<String>().trim().to_string();
            if title.chars().count() < MIN_TITLE_LEN || is_boilerplate(&title) {
                continue;
            }

            posts.push(PostRecord::new(SiteType::Universal, board, title, link));
            if posts.len() >= MAX_LINKS {
                return posts;
            }
        }
    }

    posts
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
          <h2><a href="/articles/first-story">First story headline</a></h2>
          <h3><a href="/articles/second-story">Second story headline</a></h3>
          <h3><a href="/articles/second-story">Second story headline</a></h3>
          <div class="title"><a href="/articles/third-story">Third headline here</a></div>
          <h2><a href="/nav">More</a></h2>
          <h2><a href="/short">abc</a></h2>
          <h2><a href="#">Anchor only link text</a></h2>
          <h2><a href="javascript:void(0)">Script link text here</a></h2>
        </body></html>
    "##;

    #[test]
    fn extracts_deduped_headline_links() {
        let posts = extract_posts(PAGE, "https://example.com/forum", "example.com");
        let titles: Vec<&str> = posts.iter().map(|p| p.title_original.as_str()).collect();
        assert_eq!(
            titles,
            vec!["First story headline", "Second story headline", "Third headline here"]
        );
        assert_eq!(posts[0].link, "https://example.com/articles/first-story");
        assert!(posts.iter().all(|p| p.views == 0 && p.score == 0 && p.comments == 0));
    }

    #[test]
    fn boilerplate_and_short_titles_are_dropped() {
        let posts = extract_posts(PAGE, "https://example.com/", "example.com");
        assert!(posts.iter().all(|p| p.title_original != "More"));
        assert!(posts.iter().all(|p| p.title_original.chars().count() >= MIN_TITLE_LEN));
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("example.com/forum").unwrap(), "https://example.com/forum");
        assert_eq!(normalize_url("https://a.b/c").unwrap(), "https://a.b/c");
        assert!(normalize_url("").is_err());
    }
}
