pub mod bbc;
pub mod blind;
pub mod dcinside;
pub mod fourchan;
pub mod lemmy;
pub mod reddit;
pub mod universal;
pub mod x;

use crate::boards::BoardTables;
use crate::registry::{SiteEntry, SiteRegistry};
use crosspost_common::{Config, SiteType};
use regex::Regex;
use scraper::ElementRef;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

/// Browser user agent for the HTML-scraping adapters. Sites serve a
/// stripped or empty list page to obvious bot agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Default per-request timeout for adapter HTTP calls.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the full adapter registry. Every supported site gets an explicit
/// entry; nothing is discovered reflectively.
pub fn build_registry(
    client: reqwest::Client,
    config: &Config,
    tables: Arc<BoardTables>,
) -> SiteRegistry {
    let mut registry = SiteRegistry::new();

    let reddit_client = Arc::new(reddit::RedditClient::new(
        client.clone(),
        config.reddit_client_id.clone(),
        config.reddit_client_secret.clone(),
        config.reddit_user_agent.clone(),
    ));

    registry.register(
        SiteType::Reddit,
        SiteEntry {
            adapter: Arc::new(reddit::RedditAdapter::new(reddit_client)),
            target_param: "subreddit_name",
            extra_keys: &["min_views", "min_likes"],
            dropped_keys: &[],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::Lemmy,
        SiteEntry {
            adapter: Arc::new(lemmy::LemmyAdapter::new(client.clone())),
            target_param: "community_input",
            extra_keys: &["min_views", "min_likes"],
            dropped_keys: &[],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::Dcinside,
        SiteEntry {
            adapter: Arc::new(dcinside::DcinsideAdapter::new(client.clone(), tables.clone())),
            target_param: "board_name",
            extra_keys: &["min_views", "min_likes", "min_comments"],
            dropped_keys: &[],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::Blind,
        SiteEntry {
            adapter: Arc::new(blind::BlindAdapter::new(client.clone(), tables)),
            target_param: "board_input",
            extra_keys: &["min_views", "min_likes", "min_comments"],
            dropped_keys: &[],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::Bbc,
        SiteEntry {
            adapter: Arc::new(bbc::BbcAdapter::new(client.clone())),
            target_param: "board_url",
            extra_keys: &["min_views", "min_likes", "min_comments"],
            dropped_keys: &[],
            allows_empty_target: true,
        },
    );
    registry.register(
        SiteType::FourChan,
        SiteEntry {
            adapter: Arc::new(fourchan::FourchanAdapter::new(client.clone())),
            target_param: "board_code",
            extra_keys: &["min_views", "min_likes", "min_comments", "include_media", "include_nsfw"],
            dropped_keys: &[],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::X,
        SiteEntry {
            adapter: Arc::new(x::XAdapter::new(client.clone())),
            target_param: "board_input",
            extra_keys: &["min_views", "min_likes", "min_retweets", "include_media", "include_nsfw"],
            dropped_keys: &["min_comments"],
            allows_empty_target: false,
        },
    );
    registry.register(
        SiteType::Universal,
        SiteEntry {
            adapter: Arc::new(universal::UniversalAdapter::new(client)),
            target_param: "board_url",
            extra_keys: &["min_views", "min_likes", "min_comments"],
            dropped_keys: &[],
            allows_empty_target: true,
        },
    );

    registry
}

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*").expect("static regex"))
}

/// First numeric run in a text, commas tolerated (`1,234` → 1234).
pub(crate) fn first_number(text: &str) -> Option<u64> {
    number_pattern()
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Walk a ranked selector list; the first selector whose element carries a
/// numeric run wins.
pub(crate) fn metric_from_selectors(row: &ElementRef, selectors: &[&str]) -> u64 {
    for raw in selectors {
        let selector = scraper::Selector::parse(raw).unwrap();
        for element in row.select(&selector) {
            let text: String = element.text().collect::<String>();
            if let Some(value) = first_number(text.trim()) {
                return value;
            }
        }
    }
    0
}

/// First selector in the list that matches anything wins; returns its text.
pub(crate) fn text_from_selectors(row: &ElementRef, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let selector = scraper::Selector::parse(raw).unwrap();
        if let Some(element) = row.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Resolve a possibly-relative href against a site base.
pub(crate) fn absolutize(href: &str, base: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}
