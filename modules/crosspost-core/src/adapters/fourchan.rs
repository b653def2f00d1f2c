//! 4chan board crawler.
//!
//! The read-only JSON API serves the whole catalog in one request, already
//! grouped into pages. The catalog is snapshotted per crawl, threads are
//! re-sorted to match the requested order, and the engine pages over the
//! snapshot without further network traffic.

use super::FETCH_TIMEOUT;
use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType, SortOrder};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

const API_BASE: &str = "https://a.4cdn.org";
const BOARDS_BASE: &str = "https://boards.4chan.org";
const IMAGE_BASE: &str = "https://i.4cdn.org";

const PAGE_SIZE: usize = 20;

/// Boards 4chan itself marks not-worksafe. Crawling one requires the caller
/// to opt in with `include_nsfw`.
const NSFW_BOARDS: &[&str] = &[
    "b", "r9k", "pol", "bant", "soc", "s4s", "s", "hc", "hm", "h", "e", "u", "d", "y", "t",
    "hr", "gif", "aco", "trash",
];

pub struct FourchanAdapter {
    client: reqwest::Client,
}

impl FourchanAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for FourchanAdapter {
    fn site(&self) -> SiteType {
        SiteType::FourChan
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let board = target.trim().trim_matches('/').to_lowercase();
        if board.is_empty() || !board.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CrawlError::InvalidParameters {
                detail: format!("'{target}' is not a board code"),
            });
        }
        if NSFW_BOARDS.contains(&board.as_str()) && !options.include_nsfw {
            return Err(CrawlError::InvalidParameters {
                detail: format!("/{board}/ is not worksafe; set include_nsfw to crawl it"),
            });
        }

        let url = format!("{API_BASE}/{board}/catalog.json");
        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CrawlError::BoardNotFound { input: board });
        }
        let catalog: Vec<CatalogPage> = response
            .json()
            .await
            .map_err(|e| CrawlError::Parse { detail: e.to_string() })?;

        let mut threads: Vec<CatalogThread> =
            catalog.into_iter().flat_map(|page| page.threads).collect();
        sort_threads(&mut threads, options.sort);

        let records: Vec<PostRecord> =
            threads.into_iter().map(|t| t.into_record(&board)).collect();
        let chunks: Vec<Vec<PostRecord>> =
            records.chunks(PAGE_SIZE).map(|c| c.to_vec()).collect();

        let source = FourchanSource { board, chunks };
        run_crawl(&source, options, sink, cancel).await
    }
}

/// Catalog order is bump order, which is already "hot". Other sorts are
/// applied over the snapshot.
fn sort_threads(threads: &mut [CatalogThread], sort: SortOrder) {
    match sort {
        SortOrder::Comments | SortOrder::Popular | SortOrder::Top => {
            threads.sort_by(|a, b| b.replies.cmp(&a.replies));
        }
        SortOrder::Recent | SortOrder::New => {
            threads.sort_by(|a, b| b.time.cmp(&a.time));
        }
        _ => {}
    }
}

struct FourchanSource {
    board: String,
    chunks: Vec<Vec<PostRecord>>,
}

#[async_trait]
impl PageSource for FourchanSource {
    fn site(&self) -> SiteType {
        SiteType::FourChan
    }

    fn board(&self) -> &str {
        &self.board
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn progress_floor(&self) -> u8 {
        30
    }

    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        Ok(self.chunks.get(page as usize - 1).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    threads: Vec<CatalogThread>,
}

#[derive(Debug, Deserialize)]
struct CatalogThread {
    no: u64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    replies: u64,
    #[serde(default)]
    images: u64,
    time: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tim: Option<i64>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    sticky: Option<u8>,
}

impl CatalogThread {
    fn into_record(self, board: &str) -> PostRecord {
        let title = self
            .sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(strip_html)
            .unwrap_or_else(|| {
                let text = self.com.as_deref().map(strip_html).unwrap_or_default();
                text.chars().take(80).collect()
            });
        let title = if title.trim().is_empty() {
            format!("Thread #{}", self.no)
        } else {
            title
        };

        let link = format!("{BOARDS_BASE}/{board}/thread/{}", self.no);
        let created = DateTime::<Utc>::from_timestamp(self.time, 0);

        let mut record = PostRecord::new(SiteType::FourChan, board, title, link)
            .with_metrics(0, 0, self.replies)
            .with_created_at(
                created.map(crate::dates::format_post_date).unwrap_or_default(),
                created,
            )
            .with_author(self.name.unwrap_or_else(|| "Anonymous".to_string()))
            .with_extra("images", self.images)
            .with_extra("sticky", self.sticky.unwrap_or(0) == 1);

        if let Some(body) = self.com.as_deref() {
            let preview: String = strip_html(body).chars().take(200).collect();
            record = record.with_body(preview);
        }
        if let (Some(tim), Some(ext)) = (self.tim, self.ext.as_deref()) {
            record = record
                .with_thumbnail(format!("{IMAGE_BASE}/{board}/{tim}s.jpg"))
                .with_media(format!("{IMAGE_BASE}/{board}/{tim}{ext}"));
        }
        record
    }
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

/// Comment HTML → plain text: `<br>` to spaces, tags stripped, the handful
/// of entities the API emits decoded.
fn strip_html(input: &str) -> String {
    let spaced = input.replace("<br>", " ").replace("<wbr>", "");
    let stripped = tag_pattern().replace_all(&spaced, "");
    stripped
        .replace("&amp;", "&")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&#039;", "'")
        .replace("&quot;", "\"")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(no: u64, sub: Option<&str>, replies: u64, time: i64) -> CatalogThread {
        CatalogThread {
            no,
            sub: sub.map(String::from),
            com: Some("Some <b>comment</b> with &gt;greentext".to_string()),
            replies,
            images: 2,
            time,
            name: None,
            tim: Some(1722300000000),
            ext: Some(".png".to_string()),
            sticky: None,
        }
    }

    #[test]
    fn record_mapping_builds_links_and_media() {
        let record = thread(123, Some("OP title"), 40, 1722300000).into_record("g");
        assert_eq!(record.link, "https://boards.4chan.org/g/thread/123");
        assert_eq!(record.comments, 40);
        assert_eq!(record.media_url.as_deref(), Some("https://i.4cdn.org/g/1722300000000.png"));
        assert_eq!(record.thumbnail_url.as_deref(), Some("https://i.4cdn.org/g/1722300000000s.jpg"));
        assert_eq!(record.author, "Anonymous");
        assert!(record.parsed_at.is_some());
    }

    #[test]
    fn untitled_thread_falls_back_to_comment_text() {
        let record = thread(7, None, 0, 1722300000).into_record("g");
        assert!(record.title_original.starts_with("Some comment"));
        assert!(record.title_original.contains(">greentext"));
    }

    #[test]
    fn comment_sort_orders_by_replies() {
        let mut threads = vec![thread(1, None, 5, 30), thread(2, None, 50, 10), thread(3, None, 20, 20)];
        sort_threads(&mut threads, SortOrder::Comments);
        assert_eq!(threads.iter().map(|t| t.no).collect::<Vec<_>>(), vec![2, 3, 1]);

        let mut threads = vec![thread(1, None, 5, 30), thread(2, None, 50, 10)];
        sort_threads(&mut threads, SortOrder::Recent);
        assert_eq!(threads.iter().map(|t| t.no).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn nsfw_board_table_contains_the_classics() {
        assert!(NSFW_BOARDS.contains(&"b"));
        assert!(!NSFW_BOARDS.contains(&"g"));
    }
}
