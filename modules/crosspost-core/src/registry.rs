//! The adapter registry and request dispatcher.
//!
//! The registry is an explicit, immutable table built at startup. Dispatch
//! marshals the caller's raw option map into validated `CrawlOptions`:
//! aliases are renamed, keys outside the adapter's whitelist are dropped
//! with a warning, and per-site transforms run before the adapter sees
//! anything.

use crate::adapter::BoardAdapter;
use crate::dates::{resolve_time_filter, MAX_RANGE_DAYS};
use crate::error::{CrawlError, CrawlResult};
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Widest rank range a single request may ask for.
const MAX_RANGE_SPAN: usize = 100;

/// Keys understood by every adapter.
const COMMON_KEYS: &[&str] = &[
    "limit",
    "sort",
    "time_filter",
    "start_date",
    "end_date",
    "enforce_date_limit",
    "start_index",
    "end_index",
];

/// Request keys renamed before whitelisting.
const ALIASES: &[(&str, &str)] = &[("start", "start_index"), ("end", "end_index")];

/// Keys that re-target the board identifier when present in the option map.
const TARGET_ALIASES: &[&str] = &["board", "input", "board_identifier", "board_name"];

pub struct SiteEntry {
    pub adapter: Arc<dyn BoardAdapter>,
    /// Name of the parameter that carries the board identifier, kept for
    /// logging parity with the adapters' own vocabularies.
    pub target_param: &'static str,
    /// Option keys this adapter consumes beyond the common set.
    pub extra_keys: &'static [&'static str],
    /// Common keys this adapter does NOT consume.
    pub dropped_keys: &'static [&'static str],
    /// Whether an empty board identifier is acceptable (URL-only adapters).
    pub allows_empty_target: bool,
}

impl SiteEntry {
    fn supports(&self, key: &str) -> bool {
        (COMMON_KEYS.contains(&key) && !self.dropped_keys.contains(&key))
            || self.extra_keys.contains(&key)
    }
}

#[derive(Default)]
pub struct SiteRegistry {
    entries: HashMap<SiteType, SiteEntry>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, site: SiteType, entry: SiteEntry) {
        self.entries.insert(site, entry);
    }

    pub fn entry(&self, site: SiteType) -> CrawlResult<&SiteEntry> {
        self.entries
            .get(&site)
            .ok_or_else(|| CrawlError::SiteNotFound { site: site.to_string() })
    }

    pub fn supported_sites(&self) -> Vec<SiteType> {
        let mut sites: Vec<SiteType> = self.entries.keys().copied().collect();
        sites.sort_by_key(|s| s.as_str());
        sites
    }

    /// Marshal, validate and run one crawl request.
    pub async fn dispatch(
        &self,
        site: SiteType,
        board_identifier: &str,
        raw_options: Map<String, Value>,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>> {
        let entry = self.entry(site)?;
        let (target, options) = self.prepare(site, entry, board_identifier, raw_options)?;
        tracing::info!(site = %site, board = %target, "dispatching crawl");
        entry.adapter.fetch(&target, &options, sink, cancel).await
    }

    /// Parameter marshalling without the adapter call; exposed for tests.
    pub fn prepare(
        &self,
        site: SiteType,
        entry: &SiteEntry,
        board_identifier: &str,
        mut raw: Map<String, Value>,
    ) -> CrawlResult<(String, CrawlOptions)> {
        let mut target = board_identifier.trim().to_string();

        // Alias renames (start → start_index, end → end_index)
        for (from, to) in ALIASES {
            if let Some(value) = raw.remove(*from) {
                raw.entry(to.to_string()).or_insert(value);
            }
        }

        // Explicit board keys override the detected identifier
        for key in TARGET_ALIASES {
            if let Some(Value::String(explicit)) = raw.remove(*key) {
                if !explicit.trim().is_empty() {
                    target = explicit.trim().to_string();
                }
            }
        }

        // Whitelist filter: every unsupported key is dropped and named
        let mut filtered = Map::new();
        for (key, value) in raw {
            if value.is_null() {
                continue;
            }
            if entry.supports(&key) {
                filtered.insert(key, value);
            } else {
                tracing::warn!(site = %site, parameter = %key, "dropping unsupported parameter");
            }
        }

        apply_site_transforms(site, &mut target, &mut filtered);

        if target.is_empty() && !entry.allows_empty_target {
            return Err(CrawlError::InvalidParameters {
                detail: format!("{} is required", entry.target_param),
            });
        }

        let mut options: CrawlOptions = serde_json::from_value(Value::Object(filtered))
            .map_err(|err| CrawlError::InvalidParameters { detail: err.to_string() })?;

        validate(&mut options)?;
        Ok((target, options))
    }
}

/// Per-site request rewrites applied after whitelisting.
fn apply_site_transforms(site: SiteType, target: &mut String, options: &mut Map<String, Value>) {
    match site {
        SiteType::Reddit => {
            if let Some(stripped) = target.strip_prefix("/r/").or_else(|| target.strip_prefix("r/")) {
                *target = stripped.to_string();
            }
            if let Some(Value::String(sort)) = options.get("sort") {
                let native = match sort.as_str() {
                    "popular" => Some("hot"),
                    "recommend" | "comments" => Some("top"),
                    "recent" => Some("new"),
                    _ => None,
                };
                if let Some(native) = native {
                    options.insert("sort".to_string(), Value::String(native.to_string()));
                }
            }
        }
        SiteType::Lemmy => {
            if !target.contains('@') && !target.starts_with("http") && !target.is_empty() {
                *target = format!("{target}@lemmy.world");
            }
        }
        _ => {}
    }
}

fn validate(options: &mut CrawlOptions) -> CrawlResult<()> {
    if options.start_index < 1 {
        return Err(CrawlError::InvalidParameters {
            detail: "start_index must be at least 1".to_string(),
        });
    }
    if options.end_index < options.start_index {
        return Err(CrawlError::InvalidParameters {
            detail: "end_index must not precede start_index".to_string(),
        });
    }
    if options.end_index - options.start_index > MAX_RANGE_SPAN {
        return Err(CrawlError::InvalidParameters {
            detail: format!("rank range wider than {MAX_RANGE_SPAN} posts"),
        });
    }

    // Resolve the coarse time filter into the absolute window adapters and
    // the predicate consume.
    let window = resolve_time_filter(options.time_filter, options.start_date, options.end_date)?;
    match window {
        Some((start, end)) => {
            if end < start {
                return Err(CrawlError::InvalidParameters {
                    detail: "end_date precedes start_date".to_string(),
                });
            }
            if (end - start).num_days() > MAX_RANGE_DAYS {
                return Err(CrawlError::InvalidParameters {
                    detail: format!("date range wider than {MAX_RANGE_DAYS} days"),
                });
            }
            options.start_date = Some(start);
            options.end_date = Some(end);
        }
        None => {
            options.start_date = None;
            options.end_date = None;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crosspost_common::{SortOrder, TimeFilter};

    struct NullAdapter(SiteType);

    #[async_trait]
    impl BoardAdapter for NullAdapter {
        fn site(&self) -> SiteType {
            self.0
        }
        async fn fetch(
            &self,
            _target: &str,
            _options: &CrawlOptions,
            _sink: &ProgressSink,
            _cancel: &CancelFlag,
        ) -> CrawlResult<Vec<PostRecord>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> SiteRegistry {
        let mut registry = SiteRegistry::new();
        registry.register(
            SiteType::Reddit,
            SiteEntry {
                adapter: Arc::new(NullAdapter(SiteType::Reddit)),
                target_param: "subreddit_name",
                extra_keys: &["min_views", "min_likes"],
                dropped_keys: &[],
                allows_empty_target: false,
            },
        );
        registry.register(
            SiteType::Lemmy,
            SiteEntry {
                adapter: Arc::new(NullAdapter(SiteType::Lemmy)),
                target_param: "community_input",
                extra_keys: &["min_views", "min_likes"],
                dropped_keys: &[],
                allows_empty_target: false,
            },
        );
        registry.register(
            SiteType::Universal,
            SiteEntry {
                adapter: Arc::new(NullAdapter(SiteType::Universal)),
                target_param: "board_url",
                extra_keys: &["min_views", "min_likes", "min_comments"],
                dropped_keys: &[],
                allows_empty_target: true,
            },
        );
        registry
    }

    fn raw(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn start_end_aliases_are_renamed() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let (_, options) = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[("start", Value::from(3)), ("end", Value::from(12))]),
            )
            .unwrap();
        assert_eq!(options.start_index, 3);
        assert_eq!(options.end_index, 12);
    }

    #[test]
    fn unsupported_keys_never_reach_options() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let (_, options) = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[
                    ("min_comments", Value::from(5)),
                    ("made_up_key", Value::from("x")),
                    ("min_likes", Value::from(7)),
                ]),
            )
            .unwrap();
        // min_comments is not whitelisted for this entry; it must not survive.
        assert_eq!(options.min_comments, 0);
        assert_eq!(options.min_likes, 7);
    }

    #[test]
    fn reddit_sort_aliases_and_prefix_strip() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let (target, options) = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "/r/programming",
                raw(&[("sort", Value::from("popular"))]),
            )
            .unwrap();
        assert_eq!(target, "programming");
        assert_eq!(options.sort, SortOrder::Hot);
    }

    #[test]
    fn lemmy_bare_community_gets_default_instance() {
        let registry = registry();
        let entry = registry.entry(SiteType::Lemmy).unwrap();
        let (target, _) = registry
            .prepare(SiteType::Lemmy, entry, "technology", Map::new())
            .unwrap();
        assert_eq!(target, "technology@lemmy.world");

        let (target, _) = registry
            .prepare(SiteType::Lemmy, entry, "technology@lemmy.ml", Map::new())
            .unwrap();
        assert_eq!(target, "technology@lemmy.ml");
    }

    #[test]
    fn span_boundary_is_one_hundred() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        assert!(registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[("start", Value::from(1)), ("end", Value::from(101))]),
            )
            .is_ok());
        let err = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[("start", Value::from(1)), ("end", Value::from(102))]),
            )
            .unwrap_err();
        assert!(matches!(err, CrawlError::InvalidParameters { .. }));
    }

    #[test]
    fn custom_time_filter_without_dates_is_rejected() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let err = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[("time_filter", Value::from("custom"))]),
            )
            .unwrap_err();
        assert!(matches!(err, CrawlError::InvalidParameters { .. }));
    }

    #[test]
    fn time_filter_resolves_into_window() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let (_, options) = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "rust",
                raw(&[("time_filter", Value::from("week"))]),
            )
            .unwrap();
        assert_eq!(options.time_filter, TimeFilter::Week);
        assert!(options.has_date_filter());
    }

    #[test]
    fn empty_target_only_for_url_adapters() {
        let registry = registry();
        let reddit = registry.entry(SiteType::Reddit).unwrap();
        assert!(registry.prepare(SiteType::Reddit, reddit, "", Map::new()).is_err());

        let universal = registry.entry(SiteType::Universal).unwrap();
        assert!(registry.prepare(SiteType::Universal, universal, "", Map::new()).is_ok());
    }

    #[test]
    fn board_alias_overrides_target() {
        let registry = registry();
        let entry = registry.entry(SiteType::Reddit).unwrap();
        let (target, _) = registry
            .prepare(
                SiteType::Reddit,
                entry,
                "old",
                raw(&[("board", Value::from("rust"))]),
            )
            .unwrap();
        assert_eq!(target, "rust");
    }

    #[tokio::test]
    async fn unknown_site_fails_dispatch() {
        let registry = registry();
        let err = registry
            .dispatch(
                SiteType::Bbc,
                "news",
                Map::new(),
                &ProgressSink::discard(),
                &CancelFlag::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::SiteNotFound { .. }));
    }
}
