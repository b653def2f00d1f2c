//! Media packaging: scan crawl results for media URLs, download them under
//! concurrency and size bounds, and expose a single ZIP through a
//! short-lived retrieval path.

pub mod files;
pub mod scan;

pub use scan::{collect_media_urls, is_media_url};

use crosspost_common::{details, CancelFlag, CrawlStep, PostRecord, ProgressSink, SiteType};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Per-file download cap.
const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;
/// Aggregate archive cap.
const MAX_TOTAL_BYTES: u64 = 900 * 1024 * 1024;
/// Concurrent downloads against one host.
const PER_HOST_CONCURRENT: usize = 5;
/// Concurrent downloads overall.
const OVERALL_CONCURRENT: usize = 8;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Archives older than this are removed by the sweeper.
pub const ARCHIVE_TTL: Duration = Duration::from_secs(4 * 60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("packaging cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PackagedArchive {
    pub file_name: String,
    pub path: PathBuf,
    pub entry_count: usize,
    pub skipped: usize,
    pub total_bytes: u64,
}

pub struct MediaPackager {
    client: reqwest::Client,
    media_dir: PathBuf,
    max_file_bytes: u64,
    max_total_bytes: u64,
}

impl MediaPackager {
    pub fn new(client: reqwest::Client, media_dir: PathBuf) -> Self {
        Self {
            client,
            media_dir,
            max_file_bytes: MAX_FILE_BYTES,
            max_total_bytes: MAX_TOTAL_BYTES,
        }
    }

    /// Shrink the size caps. Used by tests.
    pub fn with_limits(mut self, max_file_bytes: u64, max_total_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self.max_total_bytes = max_total_bytes;
        self
    }

    /// Download every valid media URL in `posts` and package the results
    /// into one ZIP under the media dir. Returns `None` when the posts
    /// carry no media. Individual download failures skip that file.
    pub async fn package(
        &self,
        posts: &[PostRecord],
        site: SiteType,
        sink: &ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Option<PackagedArchive>, MediaError> {
        let urls = collect_media_urls(posts);
        if urls.is_empty() {
            return Ok(None);
        }

        sink.progress(
            5,
            CrawlStep::Packaging,
            Some(site),
            None,
            details! { "media_files" => urls.len() },
        );

        let mut taken = HashSet::new();
        let named: Vec<(String, String)> = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let name = files::entry_name(&url, i, &mut taken);
                (url, name)
            })
            .collect();
        let total = named.len();

        tokio::fs::create_dir_all(&self.media_dir).await?;
        let staging = self.media_dir.join(format!(
            "staging_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S%3f")
        ));
        tokio::fs::create_dir_all(&staging).await?;

        let mut host_limits: HashMap<String, Arc<Semaphore>> = HashMap::new();
        for (url, _) in &named {
            host_limits
                .entry(crosspost_common::extract_domain(url))
                .or_insert_with(|| Arc::new(Semaphore::new(PER_HOST_CONCURRENT)));
        }

        let total_bytes = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let downloads = futures::stream::iter(named.into_iter().map(|(url, name)| {
            let host_limit = host_limits[&crosspost_common::extract_domain(&url)].clone();
            let total_bytes = total_bytes.clone();
            let done = done.clone();
            let staging = staging.clone();
            let sink = sink.clone();
            async move {
                if cancel.is_cancelled() {
                    return Err(MediaError::Cancelled);
                }
                let _permit = host_limit.acquire().await.expect("semaphore never closed");
                let outcome = self
                    .download_one(&url, &staging.join(&name), &total_bytes)
                    .await;

                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                let pct = 10 + ((finished as f64 / total as f64) * 75.0) as u8;
                sink.progress(
                    pct,
                    CrawlStep::Packaging,
                    Some(site),
                    None,
                    details! { "downloaded" => finished, "total" => total },
                );
                Ok::<bool, MediaError>(outcome)
            }
        }));

        use futures::StreamExt;
        let results: Vec<Result<bool, MediaError>> = downloads
            .buffer_unordered(OVERALL_CONCURRENT)
            .collect()
            .await;

        let mut succeeded = 0usize;
        for result in results {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(err) => {
                    let _ = tokio::fs::remove_dir_all(&staging).await;
                    return Err(err);
                }
            }
        }

        if succeeded == 0 {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Ok(None);
        }

        sink.progress(90, CrawlStep::Packaging, Some(site), None, details! { "zipping" => true });

        let file_name = format!("media_{}.zip", chrono::Utc::now().format("%Y%m%d_%H%M%S%3f"));
        let zip_path = self.media_dir.join(&file_name);
        let archive = {
            let staging = staging.clone();
            let zip_path = zip_path.clone();
            tokio::task::spawn_blocking(move || build_zip(&staging, &zip_path))
                .await
                .expect("zip task never panics")?
        };
        let _ = tokio::fs::remove_dir_all(&staging).await;

        sink.progress(
            100,
            CrawlStep::Packaging,
            Some(site),
            None,
            details! { "archive" => file_name.clone(), "entries" => archive.0 },
        );

        Ok(Some(PackagedArchive {
            file_name,
            path: zip_path,
            entry_count: archive.0,
            skipped: total - succeeded,
            total_bytes: archive.1,
        }))
    }

    /// Fetch one URL into `dest` with retry and size caps. Returns whether
    /// the file made it; failures and cap hits just skip the file.
    async fn download_one(&self, url: &str, dest: &Path, total_bytes: &AtomicU64) -> bool {
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BASE * 2u32.pow(attempt - 1)).await;
            }

            let response = match self
                .client
                .get(url)
                .timeout(DOWNLOAD_TIMEOUT)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::debug!(url, status = %response.status(), attempt, "media fetch non-success");
                    continue;
                }
                Err(err) => {
                    tracing::debug!(url, error = %err, attempt, "media fetch failed");
                    continue;
                }
            };

            if let Some(length) = response.content_length() {
                if length > self.max_file_bytes {
                    tracing::warn!(url, length, "media file over per-file cap, skipping");
                    return false;
                }
            }

            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::debug!(url, error = %err, attempt, "media body read failed");
                    continue;
                }
            };
            let len = bytes.len() as u64;
            if len > self.max_file_bytes {
                tracing::warn!(url, len, "media file over per-file cap, skipping");
                return false;
            }
            if total_bytes.fetch_add(len, Ordering::SeqCst) + len > self.max_total_bytes {
                total_bytes.fetch_sub(len, Ordering::SeqCst);
                tracing::warn!(url, "aggregate archive cap reached, skipping");
                return false;
            }

            if let Err(err) = tokio::fs::write(dest, &bytes).await {
                tracing::warn!(url, error = %err, "failed writing media file");
                total_bytes.fetch_sub(len, Ordering::SeqCst);
                return false;
            }
            return true;
        }

        tracing::warn!(url, attempts = MAX_ATTEMPTS, "media download gave up");
        false
    }

    /// Resolve an archive name to its on-disk path, rejecting anything that
    /// could escape the media dir. Returns `None` for unknown names.
    pub fn archive_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || !name.ends_with(".zip")
        {
            return None;
        }
        let path = self.media_dir.join(name);
        path.is_file().then_some(path)
    }
}

/// Zip every file in `staging` (sorted, deterministic) into `zip_path`.
/// Runs on the blocking pool; ZIP assembly is CPU work.
fn build_zip(staging: &Path, zip_path: &Path) -> Result<(usize, u64), MediaError> {
    use std::io::Write;

    let mut names: Vec<PathBuf> = std::fs::read_dir(staging)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    names.sort();

    let file = std::fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    let mut count = 0usize;
    let mut bytes = 0u64;
    for path in names {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media.bin")
            .to_string();
        writer.start_file(name, options)?;
        let data = std::fs::read(&path)?;
        writer.write_all(&data)?;
        bytes += data.len() as u64;
        count += 1;
    }
    writer.finish()?;
    Ok((count, bytes))
}

/// Remove archives older than `ttl` from `dir`. Returns how many went.
pub fn sweep_once(dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else { return 0 };
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("media_") || !name.ends_with(".zip") {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age >= ttl)
            .unwrap_or(false);
        if expired && std::fs::remove_file(&path).is_ok() {
            tracing::info!(archive = %name, "swept expired media archive");
            removed += 1;
        }
    }
    removed
}

/// Periodic TTL sweep over the media dir.
pub fn spawn_sweeper(media_dir: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dir = media_dir.clone();
            let removed = tokio::task::spawn_blocking(move || sweep_once(&dir, ARCHIVE_TTL))
                .await
                .unwrap_or(0);
            if removed > 0 {
                tracing::info!(removed, "media archive sweep complete");
            }
        }
    })
}
