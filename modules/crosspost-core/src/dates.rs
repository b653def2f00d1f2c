//! Post-date normalization.
//!
//! Sources hand back dates in whatever shape their markup happens to use:
//! absolute (`2024.05.03`, `2024-05-03`, `05/03`) or relative in English and
//! Korean (`3 hours ago`, `3시간 전`). Everything is normalized to a UTC
//! instant; two-component dates assume the current year.

use crate::error::{CrawlError, CrawlResult};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use crosspost_common::TimeFilter;
use regex::Regex;
use std::sync::OnceLock;

/// Longest accepted custom date range.
pub const MAX_RANGE_DAYS: i64 = 365;

/// Resolve a coarse time filter into an absolute `[start, end]` date pair.
/// `Custom` requires explicit dates; `All` is unbounded (`None`).
pub fn resolve_time_filter(
    filter: TimeFilter,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> CrawlResult<Option<(NaiveDate, NaiveDate)>> {
    let today = Utc::now().date_naive();
    let window = match filter {
        TimeFilter::Custom => {
            let (start, end) = match (start, end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(CrawlError::InvalidParameters {
                        detail: "time_filter=custom requires start_date and end_date".to_string(),
                    })
                }
            };
            Some((start, end))
        }
        TimeFilter::All => None,
        TimeFilter::Hour => Some(((Utc::now() - Duration::hours(1)).date_naive(), today)),
        TimeFilter::Day => Some((today - Duration::days(1), today)),
        TimeFilter::Week => Some((today - Duration::weeks(1), today)),
        TimeFilter::Month => Some((today - Duration::days(30), today)),
        TimeFilter::Year => Some((today - Duration::days(365), today)),
    };
    Ok(window)
}

fn absolute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:(?P<year>\d{4})[./-])?      # optional year
            (?P<month>\d{1,2})[./-](?P<day>\d{1,2})
            (?:\s+(?P<hour>\d{1,2}):(?P<minute>\d{2}))?",
        )
        .expect("static regex")
    })
}

fn count_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Parse a source-provided date string into a UTC instant.
pub fn parse_post_date(raw: &str) -> Option<DateTime<Utc>> {
    parse_post_date_at(raw, Utc::now())
}

/// Like [`parse_post_date`] with an explicit "now" baseline for relative
/// forms and this-year dates.
pub fn parse_post_date_at(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(instant) = parse_relative(text, now) {
        return Some(instant);
    }

    let caps = absolute_pattern().captures(text)?;
    let year = match caps.name("year") {
        Some(y) => y.as_str().parse().ok()?,
        None => now.year(),
    };
    let month: u32 = caps["month"].parse().ok()?;
    let day: u32 = caps["day"].parse().ok()?;
    let hour: u32 = caps.name("hour").map_or(Some(0), |h| h.as_str().parse().ok())?;
    let minute: u32 = caps.name("minute").map_or(Some(0), |m| m.as_str().parse().ok())?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let at = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&at))
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    let count: i64 = count_pattern().find(&lower).and_then(|m| m.as_str().parse().ok())?;

    let korean = |units: &[&str]| units.iter().any(|u| lower.contains(u));
    let english = |unit: &str| lower.contains(unit) && lower.contains("ago");

    // "주일 전" contains "일 전", so the week check runs before the day check.
    let delta = if korean(&["분 전", "분전"]) || english("minute") {
        Duration::minutes(count)
    } else if korean(&["시간 전", "시간전"]) || english("hour") {
        Duration::hours(count)
    } else if korean(&["주 전", "주전", "주일 전"]) || english("week") {
        Duration::weeks(count)
    } else if korean(&["일 전", "일전"]) || english("day") {
        Duration::days(count)
    } else if korean(&["개월 전", "달 전"]) || english("month") {
        Duration::days(count * 30)
    } else {
        return None;
    };

    Some(now - delta)
}

/// Canonical presentation format for normalized instants.
pub fn format_post_date(instant: DateTime<Utc>) -> String {
    instant.format("%Y.%m.%d %H:%M").to_string()
}
