use crate::config::CacheManagerConfig;
use crate::disk::DiskCache;
use crate::downloader::{Downloader, ProgressSink};
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::image::DecodedImage;
use crate::memory::MemoryCache;
use crate::notify::PressureSource;
use crate::stats::Stats;
use std::sync::Arc;

/// Per-call overrides for [`CacheManager::load`].
#[derive(Clone)]
pub struct LoadOptions {
    /// When `false`, bypasses both cache tiers entirely: never reads from them, never writes the
    /// result back. Defaults to `true`.
    pub cache_enabled: bool,
    /// When set, receives progress updates as the image downloads (ignored on a cache hit).
    pub progress: Option<ProgressSink>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            progress: None,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }
}

/// The public entry point: orchestrates the memory cache, disk cache, and downloader into a
/// single `load`/`prefetch` surface.
///
/// Constructed explicitly by the embedder (no ambient global state) — see the crate-level docs
/// for why that's a deliberate departure from a static-singleton cache.
pub struct CacheManager {
    memory: Arc<MemoryCache>,
    disk: Arc<DiskCache>,
    downloader: Arc<Downloader>,
    _pressure_subscription: Option<crate::notify::Subscription>,
}

impl CacheManager {
    pub async fn new(config: CacheManagerConfig) -> anyhow::Result<Arc<Self>> {
        Self::with_pressure_source(config, None).await
    }

    pub async fn with_pressure_source(
        config: CacheManagerConfig,
        pressure: Option<&PressureSource>,
    ) -> anyhow::Result<Arc<Self>> {
        let memory = Arc::new(MemoryCache::new(config.memory));
        let disk = DiskCache::new(config.disk).await?;
        let downloader = Arc::new(Downloader::new(config.download));

        let subscription = pressure.map(|source| {
            let memory = Arc::clone(&memory);
            source.subscribe(move || memory.clear())
        });

        Ok(Arc::new(Self {
            memory,
            disk,
            downloader,
            _pressure_subscription: subscription,
        }))
    }

    /// Check both cache tiers without downloading. A disk hit is promoted into the memory tier
    /// before returning, so a subsequent `get` on the same fingerprint is a memory hit.
    pub async fn get(&self, url: &str) -> Option<Arc<DecodedImage>> {
        let fp = Fingerprint::new(url);

        if let Some(image) = self.memory.get(&fp) {
            return Some(image);
        }

        if let Some(image) = self.disk.get(&fp).await {
            self.memory.put(fp, Arc::clone(&image));
            return Some(image);
        }

        None
    }

    /// Write through to both cache tiers. Disk write failures are swallowed: caching is an
    /// optimization, not a correctness requirement for the caller holding the returned image.
    pub async fn put(&self, url: &str, image: Arc<DecodedImage>) {
        let fp = Fingerprint::new(url);
        self.memory.put(fp.clone(), Arc::clone(&image));
        if let Err(err) = self.disk.put(&fp, &image).await {
            tracing::warn!(url, error = %err, "failed to persist image to disk cache");
        }
    }

    pub async fn remove(&self, url: &str) {
        let fp = Fingerprint::new(url);
        self.memory.remove(&fp);
        self.disk.remove(&fp).await;
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.memory.clear();
        self.disk.clear().await
    }

    /// The primary entry point: a cache hit short-circuits the download; a miss downloads,
    /// decodes, and (unless `opts.cache_enabled` is `false`) caches the result before returning.
    pub async fn load(self: &Arc<Self>, url: &str, opts: LoadOptions) -> Result<Arc<DecodedImage>, CacheError> {
        if opts.cache_enabled {
            if let Some(image) = self.get(url).await {
                return Ok(image);
            }
        }

        let image = self.downloader.load_image(url, opts.progress).await?;

        if opts.cache_enabled {
            self.put(url, Arc::clone(&image)).await;
        }

        Ok(image)
    }

    /// Spawn background prefetch jobs for each URL; successful fetches are cached exactly as a
    /// foreground `load` would cache them.
    pub fn prefetch(self: &Arc<Self>, urls: Vec<String>) {
        let manager = Arc::clone(self);
        self.downloader.prefetch(urls, move |url, image| {
            let manager = Arc::clone(&manager);
            async move {
                manager.put(&url, image).await;
            }
        });
    }

    pub fn cancel_prefetch(&self, urls: &[String]) {
        self.downloader.cancel_prefetch(urls);
    }

    /// Disk-resident byte total (memory is volatile and excluded from this figure).
    pub async fn byte_size(&self) -> u64 {
        self.disk.byte_size().await
    }

    pub fn stats(&self) -> Stats {
        let mem = self.memory.stats();
        let disk = self.disk.stats();
        Stats {
            hits: mem.hits + disk.hits,
            misses: mem.misses + disk.misses,
        }
    }
}
