pub mod adapter;
pub mod adapters;
pub mod boards;
pub mod dates;
pub mod detector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod registry;

pub use adapter::BoardAdapter;
pub use adapters::build_registry;
pub use boards::{BoardTables, GalleryKind};
pub use detector::SiteDetector;
pub use engine::{run_crawl, PageSource};
pub use error::{CrawlError, CrawlResult};
pub use filter::{FilterReason, PostFilter};
pub use registry::{SiteEntry, SiteRegistry};
