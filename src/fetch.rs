// src/fetch.rs

//! Fetch queue and download workers
//!
//! A `FetchContext` is an enqueue sink: plugins push [`Fetchable`] work and
//! `run()` resolves it. Downloads go to a temporary file, are verified
//! against the expected size and sha256, then renamed into place. The IO
//! runs on worker threads; completion callbacks always execute afterwards on
//! the calling (controller) thread, in enqueue order, so they are the one
//! safe place to touch a database in response to network traffic.

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for HTTP requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts per download
const MAX_RETRIES: u32 = 3;

/// Base delay between retries
const RETRY_DELAY_MS: u64 = 500;

/// Runs on the controller thread once the destination file exists
pub type CompletionCallback = Box<dyn FnOnce(&Path) -> Result<()>>;

/// One unit of fetch work
pub struct Fetchable {
    pub url: String,
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
    /// Lowercase sha256 hex of the expected content
    pub expected_hash: Option<String>,
    pub on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for Fetchable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetchable")
            .field("url", &self.url)
            .field("destination", &self.destination)
            .field("expected_size", &self.expected_size)
            .field("expected_hash", &self.expected_hash)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// Outcome of one fetch, callback included
#[derive(Debug)]
pub struct FetchResult {
    pub url: String,
    pub destination: PathBuf,
    pub outcome: Result<()>,
}

struct FetchJob {
    url: String,
    destination: PathBuf,
    expected_size: Option<u64>,
    expected_hash: Option<String>,
}

/// Queue of pending fetch work
#[derive(Default)]
pub struct FetchContext {
    queue: Vec<Fetchable>,
    cancelled: bool,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, fetchable: Fetchable) {
        debug!("queued fetch of {}", fetchable.url);
        self.queue.push(fetchable);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Inspect queued work without draining it
    pub fn queued(&self) -> &[Fetchable] {
        &self.queue
    }

    /// Drop all queued work at the next `run`
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Resolve all queued work
    ///
    /// Worker threads perform the downloads; callbacks then run serially on
    /// this thread in enqueue order. Failures are reported per item and never
    /// retried beyond the download layer's own attempts.
    pub fn run(&mut self) -> Vec<FetchResult> {
        let items = std::mem::take(&mut self.queue);
        let mut jobs = Vec::with_capacity(items.len());
        let mut callbacks = Vec::with_capacity(items.len());
        for item in items {
            callbacks.push(item.on_complete);
            jobs.push(FetchJob {
                url: item.url,
                destination: item.destination,
                expected_size: item.expected_size,
                expected_hash: item.expected_hash,
            });
        }

        if self.cancelled {
            return jobs
                .into_iter()
                .map(|job| FetchResult {
                    url: job.url,
                    destination: job.destination,
                    outcome: Err(Error::DownloadError("fetch cancelled".to_string())),
                })
                .collect();
        }

        let client = if jobs.iter().any(|j| !j.url.starts_with("file://")) {
            Client::builder().timeout(HTTP_TIMEOUT).build().ok()
        } else {
            None
        };

        let outcomes: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| {
                    let client = client.as_ref();
                    scope.spawn(move || fetch_job(client, job))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::DownloadError("fetch worker panicked".to_string()))
                    })
                })
                .collect()
        });

        jobs.into_iter()
            .zip(outcomes)
            .zip(callbacks)
            .map(|((job, outcome), callback)| {
                let outcome = match (outcome, callback) {
                    (Ok(()), Some(callback)) => callback(&job.destination),
                    (outcome, _) => outcome,
                };
                if let Err(e) = &outcome {
                    warn!("fetch of {} failed: {e}", job.url);
                }
                FetchResult {
                    url: job.url,
                    destination: job.destination,
                    outcome,
                }
            })
            .collect()
    }
}

fn fetch_job(client: Option<&Client>, job: &FetchJob) -> Result<()> {
    if let Some(parent) = job.destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::IoError(format!("create {}: {e}", parent.display())))?;
    }

    let temp = job.destination.with_extension("part");
    if let Some(local) = job.url.strip_prefix("file://") {
        fs::copy(local, &temp)
            .map_err(|e| Error::DownloadError(format!("copy {local}: {e}")))?;
    } else {
        let client = client.ok_or_else(|| {
            Error::DownloadError("http client unavailable".to_string())
        })?;
        download_http(client, &job.url, &temp)?;
    }

    if let Err(e) = verify_download(&temp, job) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    fs::rename(&temp, &job.destination).map_err(|e| {
        Error::IoError(format!(
            "move {} to {}: {e}",
            temp.display(),
            job.destination.display()
        ))
    })?;
    info!("fetched {} to {}", job.url, job.destination.display());
    Ok(())
}

/// Download with retry, streaming straight to the temporary file
fn download_http(client: &Client, url: &str, temp: &Path) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = client
            .get(url)
            .send()
            .map_err(|e| Error::DownloadError(format!("request {url}: {e}")))
            .and_then(|mut response| {
                if !response.status().is_success() {
                    return Err(Error::DownloadError(format!(
                        "HTTP {} from {url}",
                        response.status()
                    )));
                }
                let mut file = File::create(temp)
                    .map_err(|e| Error::IoError(format!("create {}: {e}", temp.display())))?;
                io::copy(&mut response, &mut file)
                    .map_err(|e| Error::IoError(format!("write {}: {e}", temp.display())))?;
                Ok(())
            });

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= MAX_RETRIES => {
                return Err(Error::DownloadError(format!(
                    "failed after {attempt} attempts: {e}"
                )))
            }
            Err(e) => {
                warn!("fetch attempt {attempt} for {url} failed: {e}, retrying");
                thread::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)));
            }
        }
    }
}

fn verify_download(path: &Path, job: &FetchJob) -> Result<()> {
    if let Some(expected) = job.expected_size {
        let actual = fs::metadata(path)
            .map_err(|e| Error::IoError(format!("stat {}: {e}", path.display())))?
            .len();
        if actual != expected {
            return Err(Error::DownloadError(format!(
                "{} is {actual} bytes, expected {expected}",
                job.url
            )));
        }
    }

    if let Some(expected) = &job.expected_hash {
        let actual = sha256_file(path)?;
        if &actual != expected {
            return Err(Error::DownloadError(format!(
                "{} hash mismatch: {actual} != {expected}",
                job.url
            )));
        }
    }

    Ok(())
}

/// Lowercase sha256 hex of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| Error::IoError(format!("read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
