use futures::StreamExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::error::{FetchError, SyncError};
use crate::hashing::digest_matches;
use crate::http_status::{is_success, status_text};
use crate::session::FetchClient;
use crate::state::{pair_requests, FetchOutcome, FetchRequest, FetchState, SkipReason, Summary};
use crate::utils::{html_excerpt, part_path};

#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
    /// Per-request limit covering the response and the whole body.
    pub timeout: Option<Duration>,
    /// Global bandwidth cap in bytes per second.
    pub rate_limit: Option<u32>,
    /// Draw a progress bar and print one line per outcome.
    pub console: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            timeout: Some(Duration::from_secs(300)),
            rate_limit: None,
            console: false,
        }
    }
}

struct Throttle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

impl Throttle {
    fn new(bytes_per_sec: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(bytes_per_sec)),
            burst: bytes_per_sec,
        }
    }

    /// Waits for `len` bytes of budget, in steps no larger than the burst size.
    async fn wait(&self, len: usize) {
        let mut remaining = len as u64;
        while remaining > 0 {
            let step = remaining.min(self.burst.get() as u64) as u32;
            if let Some(n) = NonZeroU32::new(step) {
                if self.limiter.until_n_ready(n).await.is_err() {
                    break;
                }
            }
            remaining -= step as u64;
        }
    }
}

/// Batch synchronizer: downloads every request whose destination is absent.
#[derive(Clone)]
pub struct Synchronizer {
    client: Arc<dyn FetchClient>,
    options: SyncOptions,
    throttle: Option<Arc<Throttle>>,
}

impl Synchronizer {
    pub fn new(client: Arc<dyn FetchClient>, options: SyncOptions) -> Self {
        let throttle = options
            .rate_limit
            .and_then(NonZeroU32::new)
            .map(|limit| Arc::new(Throttle::new(limit)));

        Self {
            client,
            options,
            throttle,
        }
    }

    /// Co-indexed entry point: `urls[i]` is stored at `paths[i]`.
    pub async fn sync_pairs(
        &self,
        urls: Vec<String>,
        paths: Vec<PathBuf>,
    ) -> Result<Vec<FetchOutcome>, SyncError> {
        let requests = pair_requests(urls, paths)?;
        Ok(self.sync(requests).await)
    }

    /// Returns exactly one outcome per request, in input order.
    pub async fn sync(&self, requests: Vec<FetchRequest>) -> Vec<FetchOutcome> {
        let total = requests.len();
        warn_duplicate_destinations(&requests);
        let pb = self.progress_bar(total as u64);

        let mut slots: Vec<Option<FetchOutcome>> = Vec::with_capacity(total);
        let mut to_fetch = Vec::new();
        for (index, request) in requests.into_iter().enumerate() {
            if request.path.exists() {
                let outcome =
                    FetchOutcome::new(index, request, FetchState::Skipped(SkipReason::AlreadyExists));
                self.report(&pb, &outcome);
                slots.push(Some(outcome));
            } else {
                slots.push(None);
                to_fetch.push((index, request));
            }
        }
        tracing::debug!(total, fetching = to_fetch.len(), "partitioned batch");

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(to_fetch.len());

        for (index, request) in to_fetch {
            let this = self.clone();
            let semaphore = semaphore.clone();
            let pb = pb.clone();
            let fallback = request.clone();

            let handle = tokio::spawn(async move {
                let state = match semaphore.acquire().await {
                    Ok(_permit) => this.fetch_one(index, &request).await,
                    Err(e) => FetchState::Failed(FetchError::Aborted(e.to_string())),
                };
                let outcome = FetchOutcome::new(index, request, state);
                this.report(&pb, &outcome);
                outcome
            });
            handles.push((index, fallback, handle));
        }

        for (index, request, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    discard_partial(&part_path(&request.path, index)).await;
                    let outcome =
                        FetchOutcome::new(index, request, FetchState::Failed(FetchError::Aborted(e.to_string())));
                    self.report(&pb, &outcome);
                    outcome
                }
            };
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<FetchOutcome> = slots.into_iter().flatten().collect();
        pb.finish_and_clear();
        tracing::debug!("{}", Summary::of(&outcomes));
        outcomes
    }

    async fn fetch_one(&self, index: usize, request: &FetchRequest) -> FetchState {
        let part = part_path(&request.path, index);
        // Created outside the timeout so a cancelled create cannot land after cleanup.
        let file = match File::create(&part).await {
            Ok(file) => file,
            Err(e) => return self.fail(request, &part, FetchError::from(e)).await,
        };
        let work = self.download(request, file);
        let result = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(limit)),
            },
            None => work.await,
        };

        let result = match result {
            Ok(bytes) => fs::rename(&part, &request.path)
                .await
                .map(|_| bytes)
                .map_err(FetchError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => FetchState::Downloaded { bytes },
            Err(e) => self.fail(request, &part, e).await,
        }
    }

    async fn fail(&self, request: &FetchRequest, part: &Path, error: FetchError) -> FetchState {
        discard_partial(part).await;
        tracing::warn!(url = %request.url, path = %request.path.display(), error = %error, "fetch failed");
        FetchState::Failed(error)
    }

    /// Streams the body into the temporary `file`. The caller renames it into place on success.
    async fn download(&self, request: &FetchRequest, mut file: File) -> Result<u64, FetchError> {
        let mut response = self.client.get(&request.url).await?;

        if !is_success(response.status) {
            if let Some(Ok(chunk)) = response.body.next().await {
                tracing::debug!(
                    url = %request.url,
                    status = response.status,
                    body = %html_excerpt(&chunk, 200),
                    "error response"
                );
            }
            return Err(FetchError::HttpStatus {
                code: response.status,
                text: status_text(response.status),
            });
        }

        let mut hasher = request.sha256.as_ref().map(|_| Sha256::new());
        let mut written: u64 = 0;

        while let Some(chunk) = response.body.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            if let Some(throttle) = &self.throttle {
                throttle.wait(chunk.len()).await;
            }
            file.write_all(&chunk).await?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            written += chunk.len() as u64;
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = response.content_length {
            if written != expected {
                return Err(FetchError::Network(format!(
                    "incomplete body: received {} of {} bytes",
                    written, expected
                )));
            }
        }

        if let (Some(expected), Some(hasher)) = (&request.sha256, hasher) {
            let actual = hex::encode(hasher.finalize());
            if !digest_matches(expected, &actual) {
                return Err(FetchError::HashMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(written)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.console {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr_with_hz(5));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        pb
    }

    fn report(&self, pb: &ProgressBar, outcome: &FetchOutcome) {
        tracing::debug!(index = outcome.index, url = %outcome.url, "{}", outcome);
        if self.options.console {
            pb.suspend(|| println!("{}", outcome));
        }
        pb.inc(1);
    }
}

async fn discard_partial(part: &Path) {
    match fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %part.display(), error = %e, "failed to remove partial file"),
    }
}

fn warn_duplicate_destinations(requests: &[FetchRequest]) {
    let mut seen = HashSet::new();
    for request in requests {
        if !seen.insert(&request.path) {
            tracing::warn!(
                path = %request.path.display(),
                "several requests share this destination; the last write wins"
            );
        }
    }
}
