use crate::error::CrawlResult;
use async_trait::async_trait;
use crosspost_common::{CancelFlag, CrawlOptions, PostRecord, ProgressSink, SiteType};

/// The common contract every site adapter satisfies. Adapters construct
/// URLs and parse responses; pagination, filtering and slicing live in the
/// crawl engine they delegate to.
#[async_trait]
pub trait BoardAdapter: Send + Sync {
    fn site(&self) -> SiteType;

    /// Crawl one board and return the sliced, ranked result. Options an
    /// adapter does not support are simply not consumed.
    async fn fetch(
        &self,
        target: &str,
        options: &CrawlOptions,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> CrawlResult<Vec<PostRecord>>;
}
