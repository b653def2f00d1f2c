use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The sites this service knows how to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteType {
    Reddit,
    Dcinside,
    Blind,
    Bbc,
    Lemmy,
    #[serde(rename = "4chan")]
    FourChan,
    X,
    Universal,
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reddit => "reddit",
            Self::Dcinside => "dcinside",
            Self::Blind => "blind",
            Self::Bbc => "bbc",
            Self::Lemmy => "lemmy",
            Self::FourChan => "4chan",
            Self::X => "x",
            Self::Universal => "universal",
        }
    }

    pub fn all() -> &'static [SiteType] {
        &[
            Self::Reddit,
            Self::Dcinside,
            Self::Blind,
            Self::Bbc,
            Self::Lemmy,
            Self::FourChan,
            Self::X,
            Self::Universal,
        ]
    }
}

impl std::fmt::Display for SiteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SiteType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reddit" => Ok(Self::Reddit),
            "dcinside" => Ok(Self::Dcinside),
            "blind" => Ok(Self::Blind),
            "bbc" => Ok(Self::Bbc),
            "lemmy" => Ok(Self::Lemmy),
            "4chan" | "fourchan" => Ok(Self::FourChan),
            "x" | "twitter" => Ok(Self::X),
            "universal" => Ok(Self::Universal),
            other => Err(anyhow::anyhow!("Unknown site type: {}", other)),
        }
    }
}

/// Caller-facing sort vocabulary. The dispatcher normalizes these into each
/// site's native tokens; adapters also accept their native tokens directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Recent,
    Popular,
    Recommend,
    Comments,
    Hot,
    New,
    Top,
    Rising,
    Best,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Popular => "popular",
            Self::Recommend => "recommend",
            Self::Comments => "comments",
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
            Self::Best => "best",
        }
    }
}

/// Coarse time window selector. `Custom` requires explicit dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
    Custom,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
            Self::Custom => "custom",
        }
    }
}

/// One crawled post — the universal currency every adapter emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub rank: u32,
    pub title_original: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_translated: Option<String>,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub body: String,
    pub views: u64,
    pub score: u64,
    pub comments: u64,
    /// Date string exactly as the source presented it.
    pub created_at: String,
    /// Normalized instant, carried alongside when `created_at` parses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_at: Option<DateTime<Utc>>,
    pub author: String,
    pub board: String,
    pub site: SiteType,
    /// Adapter-specific fields (flair, NSFW flag, retweets, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

impl PostRecord {
    pub fn new(site: SiteType, board: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            rank: 0,
            title_original: title.into(),
            title_translated: None,
            link: link.into(),
            external_url: None,
            thumbnail_url: None,
            media_url: None,
            body: String::new(),
            views: 0,
            score: 0,
            comments: 0,
            created_at: String::new(),
            parsed_at: None,
            author: String::new(),
            board: board.into(),
            site,
            extras: HashMap::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_metrics(mut self, views: u64, score: u64, comments: u64) -> Self {
        self.views = views;
        self.score = score;
        self.comments = comments;
        self
    }

    pub fn with_created_at(mut self, raw: impl Into<String>, parsed: Option<DateTime<Utc>>) -> Self {
        self.created_at = raw.into();
        self.parsed_at = parsed;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Set the full-resolution media URL. When it points at a known image
    /// type and no thumbnail is present, the thumbnail falls back to it.
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if self.thumbnail_url.is_none() && has_image_extension(&url) {
            self.thumbnail_url = Some(url.clone());
        }
        self.media_url = Some(url);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

pub fn has_image_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('.')
        .next()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Options for a single crawl, already validated by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub time_filter: TimeFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub min_views: u64,
    #[serde(default)]
    pub min_likes: u64,
    #[serde(default)]
    pub min_comments: u64,
    /// Repost floor; only the X adapter consumes this.
    #[serde(default)]
    pub min_retweets: u64,
    #[serde(default = "default_start_index")]
    pub start_index: usize,
    #[serde(default = "default_end_index")]
    pub end_index: usize,
    #[serde(default)]
    pub enforce_date_limit: bool,
    #[serde(default)]
    pub include_media: bool,
    #[serde(default)]
    pub include_nsfw: bool,
}

fn default_start_index() -> usize {
    1
}

fn default_end_index() -> usize {
    20
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            limit: None,
            sort: SortOrder::default(),
            time_filter: TimeFilter::default(),
            start_date: None,
            end_date: None,
            min_views: 0,
            min_likes: 0,
            min_comments: 0,
            min_retweets: 0,
            start_index: default_start_index(),
            end_index: default_end_index(),
            enforce_date_limit: false,
            include_media: false,
            include_nsfw: false,
        }
    }
}

impl CrawlOptions {
    /// Number of posts the rank range asks for.
    pub fn target_count(&self) -> usize {
        self.end_index.saturating_sub(self.start_index) + 1
    }

    /// Whether any post-level filter is active (metric floors or date range).
    pub fn has_filters(&self) -> bool {
        self.min_views > 0
            || self.min_likes > 0
            || self.min_comments > 0
            || self.has_date_filter()
    }

    /// Whether pagination should go deep to compensate for rejections.
    /// A date range alone comes from the default time filter and does not
    /// widen the page budget; metric floors and an enforced date window do.
    pub fn deep_pagination(&self) -> bool {
        self.min_views > 0 || self.min_likes > 0 || self.min_comments > 0 || self.enforce_date_limit
    }

    pub fn has_date_filter(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }
}
