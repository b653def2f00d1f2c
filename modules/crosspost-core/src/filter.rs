//! The post-level filter predicate shared by every adapter.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use crosspost_common::{CrawlOptions, PostRecord};

/// Why a post failed the predicate. Only consumed by the early-stop
/// heuristic; never shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Views,
    Likes,
    Comments,
    DateParse,
    DateRange,
}

/// Stop thresholds for consecutive predicate failures. Date-filtered crawls
/// walk reverse chronology, so a run of misses means the window is behind
/// us; unfiltered crawls tolerate more noise.
const STOP_WITH_DATE_FILTER: u32 = 10;
const STOP_WITHOUT_DATE_FILTER: u32 = 20;

#[derive(Debug, Clone)]
pub struct PostFilter {
    min_views: u64,
    min_likes: u64,
    min_comments: u64,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl PostFilter {
    pub fn new(
        min_views: u64,
        min_likes: u64,
        min_comments: u64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        let range = match (start_date, end_date) {
            (Some(start), Some(end)) => {
                let start = Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap());
                let end = Utc.from_utc_datetime(&end.and_hms_opt(23, 59, 59).unwrap());
                Some((start, end))
            }
            _ => None,
        };
        Self { min_views, min_likes, min_comments, range }
    }

    pub fn from_options(options: &CrawlOptions) -> Self {
        Self::new(
            options.min_views,
            options.min_likes,
            options.min_comments,
            options.start_date,
            options.end_date,
        )
    }

    pub fn has_date_filter(&self) -> bool {
        self.range.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.min_views > 0 || self.min_likes > 0 || self.min_comments > 0 || self.range.is_some()
    }

    /// First failing condition wins. An unparseable date only fails when a
    /// date range is active.
    pub fn check(&self, post: &PostRecord) -> Result<(), FilterReason> {
        if post.views < self.min_views {
            return Err(FilterReason::Views);
        }
        if post.score < self.min_likes {
            return Err(FilterReason::Likes);
        }
        if post.comments < self.min_comments {
            return Err(FilterReason::Comments);
        }
        if let Some((start, end)) = self.range {
            let posted = post.parsed_at.ok_or(FilterReason::DateParse)?;
            if posted < start || posted > end {
                return Err(FilterReason::DateRange);
            }
        }
        Ok(())
    }

    pub fn should_stop(&self, consecutive_fails: u32) -> bool {
        let threshold = if self.has_date_filter() {
            STOP_WITH_DATE_FILTER
        } else {
            STOP_WITHOUT_DATE_FILTER
        };
        consecutive_fails >= threshold
    }
}
