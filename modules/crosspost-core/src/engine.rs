//! The crawl-pipeline engine: one paginated fetch/filter/stop loop shared by
//! every adapter. Adapters only construct URLs and parse pages; the engine
//! owns pagination, predicate filtering, early-stop heuristics, progress
//! emission, and rank-range slicing.

use crate::error::{CrawlError, CrawlResult};
use crate::filter::PostFilter;
use async_trait::async_trait;
use crosspost_common::{details, CancelFlag, CrawlOptions, CrawlStep, PostRecord, ProgressSink, SiteType};

/// Consecutive empty pages before the crawl gives up on the source.
const EMPTY_PAGE_LIMIT: u32 = 3;

/// Page ceiling when any post-level filter is active. Unfiltered crawls stop
/// much earlier, sized from the requested rank range.
const MAX_PAGES_FILTERED: u32 = 200;
const MAX_PAGES_UNFILTERED: u32 = 20;

/// Upper bound of the collecting phase's progress band.
const COLLECT_CEILING: u8 = 75;

/// A paginated view over one board. Implementations are cheap to call per
/// page; any per-crawl setup (board resolution, auth, catalog snapshot)
/// happens before the source is handed to [`run_crawl`].
#[async_trait]
pub trait PageSource: Send + Sync {
    fn site(&self) -> SiteType;
    fn board(&self) -> &str;

    /// Typical posts per page, used to bound unfiltered pagination.
    fn page_size(&self) -> usize {
        20
    }

    /// Pages fetched concurrently per batch (1–4). Results are re-ordered by
    /// page number before filtering, so the stop heuristics stay
    /// deterministic.
    fn max_in_flight(&self) -> usize {
        1
    }

    /// Lower bound of the collecting phase's progress band (25–40).
    fn progress_floor(&self) -> u8 {
        25
    }

    /// Fetch one page, 1-based. An exhausted source returns an empty vec,
    /// never an error.
    async fn fetch_page(&self, page: u32) -> CrawlResult<Vec<PostRecord>>;
}

/// Drive a full crawl over `source`: paginate, filter, stop, slice, rank.
pub async fn run_crawl(
    source: &dyn PageSource,
    options: &CrawlOptions,
    sink: &ProgressSink,
    cancel: &CancelFlag,
) -> CrawlResult<Vec<PostRecord>> {
    let filter = PostFilter::from_options(options);
    // Matches must cover the slice end, not just the range width, or a
    // start_index above 1 would come back short.
    let needed = options.end_index;
    let max_pages = max_pages(source, options);
    let floor = source.progress_floor().clamp(25, 40);

    let mut matched: Vec<PostRecord> = Vec::new();
    let mut consecutive_fails: u32 = 0;
    let mut seen: usize = 0;
    let mut page: u32 = 1;

    'outer: while page <= max_pages {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        let in_flight = source.max_in_flight().clamp(1, 4) as u32;
        let batch = in_flight.min(max_pages - page + 1);
        // join_all preserves input order, which is page order.
        let results = futures::future::join_all(
            (0..batch).map(|offset| source.fetch_page(page + offset)),
        )
        .await;

        for page_result in results {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let posts = match page_result {
                Ok(posts) => posts,
                Err(
                    err @ (CrawlError::Auth { .. }
                    | CrawlError::BoardNotFound { .. }
                    | CrawlError::InvalidParameters { .. }
                    | CrawlError::Cancelled),
                ) => return Err(err),
                Err(err) => {
                    // A single failed page counts as an empty one.
                    tracing::warn!(site = %source.site(), page, error = %err, "page fetch failed");
                    Vec::new()
                }
            };

            if posts.is_empty() {
                consecutive_fails += 1;
                if consecutive_fails >= EMPTY_PAGE_LIMIT {
                    break 'outer;
                }
                continue;
            }
            consecutive_fails = 0;

            for post in posts {
                seen += 1;
                match filter.check(&post) {
                    Ok(()) => {
                        matched.push(post);
                        consecutive_fails = 0;
                        if matched.len() >= needed {
                            break 'outer;
                        }
                    }
                    Err(_) => consecutive_fails += 1,
                }
            }

            if filter.should_stop(consecutive_fails) {
                tracing::debug!(
                    site = %source.site(),
                    consecutive_fails,
                    "early-stop heuristic triggered"
                );
                break 'outer;
            }
        }

        page += batch;
        let pct = interpolate(floor, COLLECT_CEILING, page.min(max_pages), max_pages);
        sink.progress(
            pct,
            CrawlStep::Collecting,
            Some(source.site()),
            Some(source.board()),
            details! {
                "current_page" => page.min(max_pages),
                "max_pages" => max_pages,
                "matched_posts" => matched.len(),
                "total_checked" => seen,
                "target_range" => format!("{}-{}", options.start_index, options.end_index),
            },
        );
    }

    sink.progress(
        COLLECT_CEILING,
        CrawlStep::Filtering,
        Some(source.site()),
        Some(source.board()),
        details! { "matched_posts" => matched.len(), "total_checked" => seen },
    );

    Ok(slice_and_rank(matched, options))
}

fn max_pages(source: &dyn PageSource, options: &CrawlOptions) -> u32 {
    if options.deep_pagination() {
        MAX_PAGES_FILTERED
    } else {
        let page_size = source.page_size().max(1);
        let needed = (options.end_index as u32).div_ceil(page_size as u32) + 3;
        needed.min(MAX_PAGES_UNFILTERED).max(1)
    }
}

fn interpolate(floor: u8, ceiling: u8, step: u32, of: u32) -> u8 {
    let span = f64::from(ceiling - floor);
    let fraction = f64::from(step) / f64::from(of.max(1));
    (f64::from(floor) + span * fraction.min(1.0)).round() as u8
}

/// Apply the rank-range slice and assign dense ranks from `start_index`.
fn slice_and_rank(matched: Vec<PostRecord>, options: &CrawlOptions) -> Vec<PostRecord> {
    let skip = options.start_index.saturating_sub(1);
    let mut result: Vec<PostRecord> = matched
        .into_iter()
        .skip(skip)
        .take(options.target_count())
        .collect();
    for (i, post) in result.iter_mut().enumerate() {
        post.rank = (options.start_index + i) as u32;
    }
    result
}
