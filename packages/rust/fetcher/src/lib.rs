//! Remote image downloader for the asset cache.
//!
//! Every pending [`FetchTask`] is downloaded as an independent tokio task.
//! Tasks are deduplicated by destination, files already on disk are skipped,
//! and each download lands in `<dest>.part` before being renamed into place so
//! an interrupted run never leaves a truncated cache entry behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use quillbook_shared::{FetchConfig, FetchTask, QuillbookError, Result};

// ---------------------------------------------------------------------------
// FetchReport
// ---------------------------------------------------------------------------

/// Summary of a completed fetch phase.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Number of assets downloaded in this run.
    pub downloaded: usize,
    /// Number of assets already present in the cache.
    pub skipped: usize,
    /// Failed downloads as `(url, message)`.
    pub errors: Vec<(String, String)>,
    /// Wall-clock time of the phase.
    pub duration: Duration,
}

impl FetchReport {
    /// Turn a report with failures into [`QuillbookError::Fetch`].
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(QuillbookError::fetch(&self.errors))
        }
    }
}

// ---------------------------------------------------------------------------
// AssetFetcher
// ---------------------------------------------------------------------------

/// Concurrent asset downloader.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: Client,
}

impl AssetFetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuillbookError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Download every task whose destination does not exist yet.
    ///
    /// All downloads run concurrently and this returns only once every one of
    /// them has settled. Individual failures are collected in
    /// [`FetchReport::errors`]; use [`FetchReport::into_result`] to fail on them.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub async fn fetch_all(&self, tasks: Vec<FetchTask>) -> Result<FetchReport> {
        let start_time = Instant::now();
        let mut report = FetchReport::default();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut pending: Vec<FetchTask> = Vec::new();
        for task in tasks {
            if !seen.insert(task.dest.clone()) {
                continue;
            }
            if task.dest.exists() {
                debug!(path = %task.dest.display(), "already cached, skipping");
                report.skipped += 1;
                continue;
            }
            pending.push(task);
        }

        let parents: HashSet<&Path> = pending.iter().filter_map(|t| t.dest.parent()).collect();
        for dir in parents.into_iter().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| QuillbookError::io(dir, e))?;
        }

        info!(
            pending = pending.len(),
            skipped = report.skipped,
            "starting asset downloads"
        );

        let mut handles = Vec::with_capacity(pending.len());
        for task in pending {
            let client = self.client.clone();
            let url = task.url.clone();
            handles.push((
                url,
                tokio::spawn(async move { download(&client, &task.url, &task.dest).await }),
            ));
        }

        for (url, handle) in handles {
            match handle.await {
                Ok(Ok(bytes)) => {
                    debug!(%url, bytes, "downloaded asset");
                    report.downloaded += 1;
                }
                Ok(Err(e)) => {
                    warn!(%url, error = %e, "asset download failed");
                    report.errors.push((url, e.to_string()));
                }
                Err(e) => {
                    warn!(%url, error = %e, "asset download task aborted");
                    report.errors.push((url, format!("task failed: {e}")));
                }
            }
        }

        report.duration = start_time.elapsed();

        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            errors = report.errors.len(),
            duration_ms = report.duration.as_millis(),
            "asset downloads completed"
        );

        Ok(report)
    }
}

/// Fetch one URL into `dest`, returning the number of bytes written.
async fn download(client: &Client, url: &str, dest: &Path) -> Result<usize> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| QuillbookError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(QuillbookError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| QuillbookError::Network(format!("{url}: {e}")))?;

    let part = part_path(dest);
    tokio::fs::write(&part, &body)
        .await
        .map_err(|e| QuillbookError::io(&part, e))?;
    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| QuillbookError::io(dest, e))?;

    Ok(body.len())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
