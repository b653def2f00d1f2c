//! Blind topic crawler.
//!
//! HTML scraping of `/kr/topics/{topic_id}` with sort query parameters. The
//! topic id comes from the board resolver; list markup is extracted through
//! the same ranked-selector approach as DCInside. Post dates arrive as
//! relative strings in both Korean and English.

use super::{metric_from_selectors, text_from_selectors, BROWSER_USER_AGENT, FETCH_TIMEOUT};
use crate::adapter::BoardAdapter;
use crate::boards::BoardTables;
use crate::dates::parse_post_date;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType, SortOrder};
use scraper::{Html, Selector};
use std::sync::Arc;

const BASE: &str = "https://www.teamblind.com";

const ITEM_SELECTORS: &[&str] =
    &["div.article-list-pre", ".post-item", ".article-item", ".topic-item", ".list-item"];
const TITLE_SELECTORS: &[&str] = &["h3 > a", ".title a", ".subject a", ".post-title a", ".article-title a"];
const BODY_SELECTORS: &[&str] = &["p.pre-txt > a", ".preview", ".excerpt", ".post-preview"];
const VIEW_SELECTORS: &[&str] = &[".view-count", ".views", r#"[class*="view"]"#, ".count"];
const LIKE_SELECTORS: &[&str] = &[".like-count", ".likes", ".recommend", r#"[class*="like"]"#, ".vote"];
const COMMENT_SELECTORS: &[&str] = &[".comment-count", ".comments", r#"[class*="comment"]"#, ".reply", r#"[class*="reply"]"#];
const DATE_SELECTORS: &[&str] = &[".date", ".time", ".posting-time", ".created-at", r#"[class*="date"]"#, ".timestamp"];
const AUTHOR_SELECTORS: &[&str] = &[".author", ".writer", r#"[class*="author"]"#, ".nickname", ".user"];

pub struct BlindAdapter {
    client: reqwest::Client,
    tables: Arc<BoardTables>,
}

impl BlindAdapter {
    pub fn new(client: reqwest::Client, tables: Arc<BoardTables>) -> Self {
        Self { client, tables }
    }
}

#[async_trait]
impl BoardAdapter for BlindAdapter {
    fn site(&self) -> SiteType {
        SiteType::Blind
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let topic_id = self.tables.resolve_topic(target)?;
        let mut base_url = format!("{BASE}/kr/topics/{topic_id}");
        if let Some(params) = sort_params(options.sort) {
            base_url.push('?');
            base_url.push_str(params);
        }

        let source = BlindSource {
            client: self.client.clone(),
            base_url,
            board: target.to_string(),
        };
        run_crawl(&source, options, sink, cancel).await
    }
}

fn sort_params(sort: SortOrder) -> Option<&'static str> {
    match sort {
        SortOrder::Popular => Some("sort=popular&order=desc"),
        SortOrder::Recommend => Some("sort=recommend&order=desc"),
        SortOrder::Comments => Some("sort=reply&order=desc"),
        SortOrder::Hot => Some("sort=hot&order=desc"),
        SortOrder::Recent | SortOrder::New => Some("sort=recent&order=desc"),
        _ => None,
    }
}

struct BlindSource {
    client: reqwest::Client,
    base_url: String,
    board: String,
}

#[async_trait]
impl PageSource for BlindSource {
    fn site(&self) -> SiteType {
        SiteType::Blind
    }

    fn board(&self) -> &str {
        &self.board
    }

    fn page_size(&self) -> usize {
        20
    }

    fn max_in_flight(&self) -> usize {
        2
    }

    fn progress_floor(&self) -> u8 {
        30
    }

    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        let joiner = if self.base_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{joiner}page={page}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        Ok(parse_topic_page(&body, &self.board))
    }
}

fn parse_topic_page(html: &str, board: &str) -> Vec<PostRecord> {
    let document = Html::parse_document(html);

    let mut items = Vec::new();
    for raw in ITEM_SELECTORS {
        let selector = Selector::parse(raw).unwrap();
        items = document.select(&selector).collect();
        if !items.is_empty() {
            break;
        }
    }

    let mut posts = Vec::new();
    for item in items {
        let Some(title_anchor) = TITLE_SELECTORS.iter().find_map(|raw| {
            let selector = Selector::parse(raw).unwrap();
            item.select(&selector).next()
        }) else {
            continue;
        };

        let title = title_anchor.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let link = title_anchor
            .value()
            .attr("href")
            .map(|href| super::absolutize(href, BASE))
            .unwrap_or_default();
        if link.is_empty() {
            continue;
        }

        let body = text_from_selectors(&item, BODY_SELECTORS).unwrap_or_default();
        let views = metric_from_selectors(&item, VIEW_SELECTORS);
        let likes = metric_from_selectors(&item, LIKE_SELECTORS);
        let comments = metric_from_selectors(&item, COMMENT_SELECTORS);
        let date_raw = text_from_selectors(&item, DATE_SELECTORS).unwrap_or_default();
        let author = text_from_selectors(&item, AUTHOR_SELECTORS).unwrap_or_else(|| "익명".to_string());
        let parsed = parse_post_date(&date_raw);

        posts.push(
            PostRecord::new(SiteType::Blind, board, title, link)
                .with_body(body)
                .with_metrics(views, likes, comments)
                .with_created_at(date_raw, parsed)
                .with_author(author),
        );
    }
    posts
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC_PAGE: &str = r#"
        <div class="wrap">
          <div class="article-list-pre">
            <h3><a href="/kr/post/abc123">이직 고민 들어주실 분</a></h3>
            <p class="pre-txt"><a href="/kr/post/abc123">연봉은 괜찮은데 성장이 없는 것 같습니다</a></p>
            <span class="author">네이버직원</span>
            <span class="date">3시간 전</span>
            <span class="view-count">조회 420</span>
            <span class="like-count">좋아요 15</span>
            <span class="comment-count">댓글 8</span>
          </div>
          <div class="article-list-pre">
            <h3><a href="https://www.teamblind.com/kr/post/def456">What is a fair raise?</a></h3>
            <span class="date">2 hours ago</span>
            <span class="view-count">12</span>
          </div>
        </div>
    "#;

    #[test]
    fn items_parse_with_korean_metrics() {
        let posts = parse_topic_page(TOPIC_PAGE, "블라블라");
        assert_eq!(posts.len(), 2);

        let first = &posts[0];
        assert_eq!(first.link, "https://www.teamblind.com/kr/post/abc123");
        assert_eq!(first.views, 420);
        assert_eq!(first.score, 15);
        assert_eq!(first.comments, 8);
        assert!(!first.body.is_empty());
        assert!(first.parsed_at.is_some());
    }

    #[test]
    fn english_relative_dates_parse_too() {
        let posts = parse_topic_page(TOPIC_PAGE, "블라블라");
        assert!(posts[1].parsed_at.is_some());
        assert_eq!(posts[1].views, 12);
        assert_eq!(posts[1].score, 0);
    }

    #[test]
    fn every_sort_token_has_a_query_mapping() {
        for sort in [SortOrder::Popular, SortOrder::Recommend, SortOrder::Comments, SortOrder::Hot, SortOrder::Recent] {
            assert!(sort_params(sort).is_some());
        }
    }
}
