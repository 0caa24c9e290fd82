mod request;

use crate::dedup::Deduplicator;
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::image::DecodedImage;
use crate::limiter::ConcurrencyLimiter;
use crate::prefetch::PrefetchRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`Downloader`]. See the crate-level config defaults table.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            headers: HashMap::new(),
            max_concurrent: 6,
        }
    }
}

/// A monotonic, best-effort progress callback: `0.0..=1.0`, called zero or more times, never
/// after `load_image` returns or errors.
pub type ProgressSink = Arc<dyn Fn(f32) + Send + Sync>;

/// Fetches bytes over HTTP with retry/backoff, deduplicates concurrent identical requests, and
/// bounds overall concurrency. Owns its `Deduplicator`, `ConcurrencyLimiter`, and
/// `PrefetchRegistry` for as long as it's kept alive by the embedder — there is no process-wide
/// static state here.
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
    dedup: Deduplicator,
    limiter: ConcurrencyLimiter,
    prefetch: PrefetchRegistry,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Self {
        let limiter = ConcurrencyLimiter::new(config.max_concurrent);
        Self {
            client: reqwest::Client::new(),
            config,
            dedup: Deduplicator::new(),
            limiter,
            prefetch: PrefetchRegistry::new(),
        }
    }

    /// Fetch and decode the image at `url`. Concurrent callers for the same fingerprint join a
    /// single underlying download. `progress` is invoked as bytes arrive, when provided.
    pub async fn load_image(
        &self,
        url: &str,
        progress: Option<ProgressSink>,
    ) -> Result<Arc<DecodedImage>, CacheError> {
        let fp = Fingerprint::new(url);
        let bytes = self.download_deduplicated(fp, url, progress).await?;
        let bytes = (*bytes).clone();
        let image = tokio::task::spawn_blocking(move || DecodedImage::decode(&bytes))
            .await
            .map_err(|e| CacheError::Unknown(e.to_string()))??;
        Ok(Arc::new(image))
    }

    async fn download_deduplicated(
        &self,
        fp: Fingerprint,
        url: &str,
        progress: Option<ProgressSink>,
    ) -> Result<Arc<Vec<u8>>, CacheError> {
        let client = self.client.clone();
        let config = self.config.clone();
        let limiter = self.limiter.clone();
        let url = url.to_string();

        self.dedup
            .run(fp, move || async move {
                limiter
                    .with_limit(|| download_with_retry(&client, &url, &config, progress))
                    .await
            })
            .await
    }

    /// Spawn background-priority fetches for each URL, caching each result via `on_fetched`.
    /// Errors are silently dropped, matching prefetch's best-effort contract.
    pub fn prefetch<F, Fut>(self: &Arc<Self>, urls: Vec<String>, on_fetched: F)
    where
        F: Fn(String, Arc<DecodedImage>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let on_fetched = Arc::new(on_fetched);
        for url in urls {
            let fp = Fingerprint::new(&url);
            let downloader = Arc::clone(self);
            let on_fetched = Arc::clone(&on_fetched);
            let handle = tokio::spawn(async move {
                // Best-effort background priority: yield once before starting so foreground work
                // queued around the same time gets first crack at the executor.
                tokio::task::yield_now().await;
                if let Ok(image) = downloader.load_image(&url, None).await {
                    on_fetched(url, image).await;
                }
            });
            self.prefetch.add(fp, handle.abort_handle());
        }
    }

    /// Cancel background prefetch jobs for the given URLs. Never cancels a foreground
    /// `load_image` joined on the same fingerprint: this only aborts the prefetch task, and the
    /// underlying download's `Deduplicator` entry is only torn down once every joiner (prefetch
    /// included) has gone away.
    pub fn cancel_prefetch(&self, urls: &[String]) {
        for url in urls {
            self.prefetch.cancel(&Fingerprint::new(url));
        }
    }
}

/// Combine a new in-progress fraction with the best fraction seen across all attempts so far.
/// A fresh retry attempt restarts `received` from zero, but the value forwarded to the caller's
/// sink must never go backwards, so this always returns `max(prev_high_water, new fraction)`.
fn merge_progress(prev_high_water: f32, received: u64, total: u64) -> f32 {
    let frac = (received as f32 / total as f32).min(1.0);
    frac.max(prev_high_water)
}

async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    config: &DownloadConfig,
    progress: Option<ProgressSink>,
) -> Result<Vec<u8>, CacheError> {
    let mut attempt = 0;
    // A retry restarts the byte stream from zero, but the sink's contract is monotonic
    // non-decreasing across the whole `load_image` call, not just within one attempt. Track the
    // best value seen so far here, outside the loop, so a fresh attempt never reports backwards.
    let high_water = std::sync::atomic::AtomicU32::new(0.0f32.to_bits());
    loop {
        let sink = progress.clone();
        let high_water = &high_water;
        let result = request::stream_get(client, url, config.timeout, &config.headers, move |received, total| {
            if let (Some(sink), Some(total)) = (&sink, total) {
                if total > 0 {
                    let prev = f32::from_bits(high_water.load(std::sync::atomic::Ordering::Relaxed));
                    let merged = merge_progress(prev, received, total);
                    high_water.store(merged.to_bits(), std::sync::atomic::Ordering::Relaxed);
                    sink(merged);
                }
            }
        })
        .await;

        match result {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                if !err.is_retriable() || attempt >= config.max_retries {
                    tracing::warn!(url, attempt, error = %err, "download failed, giving up");
                    return Err(err);
                }
                let backoff = config.retry_delay * 2u32.pow(attempt);
                tracing::debug!(url, attempt, ?backoff, error = %err, "retrying download");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
