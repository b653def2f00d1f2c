//! DCInside gallery crawler.
//!
//! Paginated HTML scraping over two URL schemes chosen by the resolver's
//! board kind: regular galleries live under `/board/lists/`, minor galleries
//! under `/mgallery/board/lists/`. List markup varies between gallery
//! generations, so every field is extracted through a ranked selector list.

use super::{metric_from_selectors, text_from_selectors, BROWSER_USER_AGENT, FETCH_TIMEOUT};
use crate::adapter::BoardAdapter;
use crate::boards::{BoardTables, GalleryKind};
use crate::dates::parse_post_date;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType, SortOrder};
use scraper::{Html, Selector};
use std::sync::Arc;

const BASE: &str = "https://gall.dcinside.com";

const ROW_SELECTORS: &[&str] = &["tr.ub-content", "tr.us-post", ".gall_list tr", "tbody tr"];
const TITLE_SELECTORS: &[&str] = &[".gall_tit a", ".ub-word a", "td.gall_tit a", ".title a", ".subject a"];
const VIEW_SELECTORS: &[&str] = &[".gall_count", ".view_count", ".hit", r#"[class*="hit"]"#, r#"[class*="view"]"#];
const LIKE_SELECTORS: &[&str] = &[".gall_recommend", ".recommend_count", ".up_num", r#"[class*="recommend"]"#];
const REPLY_SELECTORS: &[&str] = &[".gall_reply_num", ".reply_num", ".comment_count", r#"[class*="reply"]"#];
const DATE_SELECTORS: &[&str] = &[".gall_date", ".date", ".posting_time", r#"[class*="date"]"#];
const AUTHOR_SELECTORS: &[&str] = &[".gall_writer", ".writer", ".nickname", r#"[class*="writer"]"#];

pub struct DcinsideAdapter {
    client: reqwest::Client,
    tables: Arc<BoardTables>,
}

impl DcinsideAdapter {
    pub fn new(client: reqwest::Client, tables: Arc<BoardTables>) -> Self {
        Self { client, tables }
    }
}

#[async_trait]
impl BoardAdapter for DcinsideAdapter {
    fn site(&self) -> SiteType {
        SiteType::Dcinside
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let (gallery_id, kind) = self.tables.resolve_gallery(target)?;
        let mut base_url = match kind {
            GalleryKind::Minor => format!("{BASE}/mgallery/board/lists/?id={gallery_id}"),
            GalleryKind::Regular => format!("{BASE}/board/lists/?id={gallery_id}"),
        };
        if let Some(sort_params) = sort_params(options.sort) {
            base_url.push('&');
            base_url.push_str(sort_params);
        }

        let source = DcinsideSource {
            client: self.client.clone(),
            base_url,
            board: target.to_string(),
        };
        run_crawl(&source, options, sink, cancel).await
    }
}

fn sort_params(sort: SortOrder) -> Option<&'static str> {
    match sort {
        SortOrder::Recommend => Some("sort_type=recommend&order=desc"),
        SortOrder::Popular | SortOrder::Hot => Some("sort_type=hit&order=desc"),
        SortOrder::Comments => Some("sort_type=reply&order=desc"),
        _ => None,
    }
}

struct DcinsideSource {
    client: reqwest::Client,
    base_url: String,
    board: String,
}

#[async_trait]
impl PageSource for DcinsideSource {
    fn site(&self) -> SiteType {
        SiteType::Dcinside
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

    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        let url = format!("{}&page={page}", self.base_url);
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

        Ok(parse_list_page(&body, &self.board))
    }
}

/// Extract post rows from one list page. Rows without a recognizable title
/// link (notices, ads) are skipped.
fn parse_list_page(html: &str, board: &str) -> Vec<PostRecord> {
    let document = Html::parse_document(html);

    let mut rows = Vec::new();
    for raw in ROW_SELECTORS {
        let selector = Selector::parse(raw).unwrap();
        rows = document.select(&selector).collect();
        if !rows.is_empty() {
            break;
        }
    }

    let mut posts = Vec::new();
    for row in rows {
        let Some(title_anchor) = TITLE_SELECTORS.iter().find_map(|raw| {
            let selector = Selector::parse(raw).unwrap();
            row.select(&selector).next()
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

        let views = metric_from_selectors(&row, VIEW_SELECTORS);
        let likes = metric_from_selectors(&row, LIKE_SELECTORS);
        let comments = metric_from_selectors(&row, REPLY_SELECTORS);
        let date_raw = text_from_selectors(&row, DATE_SELECTORS).unwrap_or_default();
        let author = text_from_selectors(&row, AUTHOR_SELECTORS).unwrap_or_else(|| "익명".to_string());
        let parsed = parse_post_date(&date_raw);

        posts.push(
            PostRecord::new(SiteType::Dcinside, board, title, link)
                .with_metrics(views, likes, comments)
                .with_created_at(date_raw, parsed)
                .with_author(author),
        );
    }
    posts
}
