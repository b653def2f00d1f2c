//! Lemmy community crawler.
//!
//! Plain REST against the community's own instance: `community@instance` is
//! split and `/api/v3/post/list` paginated. The dispatcher has already
//! appended the default instance to bare community names.

use super::FETCH_TIMEOUT;
use crate::adapter::BoardAdapter;
use crate::engine::{run_crawl, PageSource};
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType, SortOrder, TimeFilter};
use serde::Deserialize;

const PAGE_SIZE: usize = 50;

pub struct LemmyAdapter {
    client: reqwest::Client,
}

impl LemmyAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoardAdapter for LemmyAdapter {
    fn site(&self) -> SiteType {
        SiteType::Lemmy
    }

    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let (community, instance) = split_community(target)?;
        let source = LemmySource {
            client: self.client.clone(),
            api_base: format!("https://{instance}/api/v3"),
            community: community.clone(),
            board: target.to_string(),
            sort: native_sort(options.sort, options.time_filter).to_string(),
        };
        run_crawl(&source, options, sink, cancel).await
    }
}

/// `community@instance` → (community, instance). A full URL is reduced to
/// its `/c/` community first.
fn split_community(target: &str) -> CrawlResult<(String, String)> {
    let target = target.trim();
    if let Some((community, instance)) = target.split_once('@') {
        if community.is_empty() || instance.is_empty() {
            return Err(CrawlError::InvalidParameters {
                detail: format!("community '{target}' is not community@instance"),
            });
        }
        return Ok((community.to_string(), instance.to_string()));
    }
    Err(CrawlError::InvalidParameters {
        detail: format!("community '{target}' is missing an instance"),
    })
}

/// Map the normalized sort vocabulary onto Lemmy's `SortType`. `top` widens
/// with the time filter the way Lemmy's own UI does.
fn native_sort(sort: SortOrder, time_filter: TimeFilter) -> &'static str {
    match sort {
        SortOrder::Hot | SortOrder::Popular => "Hot",
        SortOrder::New | SortOrder::Recent => "New",
        SortOrder::Comments => "MostComments",
        SortOrder::Rising | SortOrder::Best => "Active",
        SortOrder::Top | SortOrder::Recommend => match time_filter {
            TimeFilter::Hour | TimeFilter::Day => "TopDay",
            TimeFilter::Week => "TopWeek",
            TimeFilter::Month => "TopMonth",
            TimeFilter::Year => "TopYear",
            TimeFilter::All | TimeFilter::Custom => "TopAll",
        },
    }
}

struct LemmySource {
    client: reqwest::Client,
    api_base: String,
    community: String,
    board: String,
    sort: String,
}

#[async_trait]
impl PageSource for LemmySource {
    fn site(&self) -> SiteType {
        SiteType::Lemmy
    }

    fn board(&self) -> &str {
        &self.board
    }

    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    fn max_in_flight(&self) -> usize {
        2
    }

    fn progress_floor(&self) -> u8 {
        30
    }

    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>> {
        let url = format!(
            "{}/post/list?community_name={}&sort={}&limit={}&page={}&type_=All",
            self.api_base, self.community, self.sort, PAGE_SIZE, page
        );
        let response = self
            .client
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| CrawlError::from_request(e, &url))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CrawlError::BoardNotFound { input: self.board.clone() });
        }
        if !status.is_success() {
            return Ok(Vec::new());
        }

        let listing: PostListResponse = response
            .json()
            .await
            .map_err(|e| CrawlError::Parse { detail: e.to_string() })?;

        Ok(listing
            .posts
            .into_iter()
            .map(|view| view.into_record(&self.board))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct PostListResponse {
    posts: Vec<PostView>,
}

#[derive(Debug, Deserialize)]
struct PostView {
    post: LemmyPost,
    creator: Creator,
    counts: Counts,
}

#[derive(Debug, Deserialize)]
struct LemmyPost {
    name: String,
    ap_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    published: String,
    #[serde(default)]
    nsfw: bool,
}

#[derive(Debug, Deserialize)]
struct Creator {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Counts {
    score: i64,
    comments: u64,
}

impl PostView {
    fn into_record(self, board: &str) -> PostRecord {
        let parsed = chrono::DateTime::parse_from_rfc3339(&self.post.published)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let mut record = PostRecord::new(SiteType::Lemmy, board, self.post.name, self.post.ap_id)
            .with_metrics(0, self.counts.score.max(0) as u64, self.counts.comments)
            .with_created_at(self.post.published.clone(), parsed)
            .with_author(self.creator.name)
            .with_extra("nsfw", self.post.nsfw);

        if let Some(body) = self.post.body {
            let preview: String = body.chars().take(200).collect();
            record = record.with_body(preview);
        }
        if let Some(thumbnail) = self.post.thumbnail_url {
            record = record.with_thumbnail(thumbnail);
        }
        if let Some(external) = self.post.url {
            if crosspost_common::has_image_extension(&external) {
                record = record.with_media(external);
            } else {
                record = record.with_external_url(external);
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post_json(n: u32, score: i64) -> serde_json::Value {
        serde_json::json!({
            "post": {
                "name": format!("Post number {n}"),
                "ap_id": format!("https://lemmy.world/post/{n}"),
                "url": null,
                "thumbnail_url": null,
                "body": "body text",
                "published": "2026-07-30T10:00:00Z",
                "nsfw": false
            },
            "creator": {"name": "author"},
            "counts": {"score": score, "comments": 4}
        })
    }

    #[test]
    fn community_splitting() {
        assert_eq!(
            split_community("technology@lemmy.world").unwrap(),
            ("technology".to_string(), "lemmy.world".to_string())
        );
        assert!(split_community("technology").is_err());
        assert!(split_community("@lemmy.world").is_err());
    }

    #[test]
    fn sort_mapping_widens_top_with_time_filter() {
        assert_eq!(native_sort(SortOrder::Top, TimeFilter::Day), "TopDay");
        assert_eq!(native_sort(SortOrder::Top, TimeFilter::Week), "TopWeek");
        assert_eq!(native_sort(SortOrder::Top, TimeFilter::All), "TopAll");
        assert_eq!(native_sort(SortOrder::Recent, TimeFilter::Day), "New");
        assert_eq!(native_sort(SortOrder::Comments, TimeFilter::Day), "MostComments");
    }

    #[tokio::test]
    async fn fetch_applies_score_floor_via_engine() {
        let server = MockServer::start().await;
        let posts: Vec<serde_json::Value> =
            (1..=10).map(|n| post_json(n, if n % 2 == 0 { 50 } else { 2 })).collect();
        Mock::given(method("GET"))
            .and(path("/api/v3/post/list"))
            .and(query_param("community_name", "technology"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"posts": posts})))
            .mount(&server)
            .await;
        // Pages past the first are empty.
        let source = LemmySource {
            client: reqwest::Client::new(),
            api_base: format!("{}/api/v3", server.uri()),
            community: "technology".to_string(),
            board: "technology@lemmy.world".to_string(),
            sort: "Hot".to_string(),
        };

        let options = CrawlOptions {
            min_likes: 10,
            start_index: 1,
            end_index: 3,
            time_filter: TimeFilter::All,
            ..Default::default()
        };
        let result = run_crawl(
            &source,
            &options,
            &crosspost_common::ProgressSink::discard(),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|p| p.score >= 10));
        assert_eq!(result.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_community_is_board_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/post/list"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = LemmySource {
            client: reqwest::Client::new(),
            api_base: format!("{}/api/v3", server.uri()),
            community: "missing".to_string(),
            board: "missing@lemmy.world".to_string(),
            sort: "Hot".to_string(),
        };
        let err = source.fetch_page(1).await.unwrap_err();
        assert!(matches!(err, CrawlError::BoardNotFound { .. }));
    }
}
