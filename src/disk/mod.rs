use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::image::DecodedImage;
use crate::stats::{Stats, StatsRecorder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

#[cfg(test)]
mod tests;

/// Tunables for [`DiskCache`]. See the crate-level config defaults table.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskConfig {
    pub directory: PathBuf,
    pub max_disk_bytes: u64,
    pub max_age: Option<Duration>,
    pub quality: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        let root = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            directory: root.join("ImageCache"),
            max_disk_bytes: 100 * 1024 * 1024,
            max_age: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            quality: 80,
        }
    }
}

/// A clock abstraction so tests can control the passage of time deterministically, generalizing
/// the injectable-clock pattern to an async-friendly trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

#[derive(Default)]
struct Metadata {
    access_times: BTreeMap<String, f64>,
    creation_times: BTreeMap<String, f64>,
}

/// Content-addressed, persistent, LRU+TTL bounded store of JPEG-encoded image bytes.
///
/// On disk, each cached image is `<fingerprint>.img` under `directory`, with two JSON sidecar
/// files (`access_times.json`, `creation_times.json`) mapping fingerprint to epoch-seconds
/// timestamps. Every mutating operation rewrites the sidecars atomically (write-to-temp then
/// rename).
pub struct DiskCache {
    config: DiskConfig,
    metadata: Mutex<Metadata>,
    stats: StatsRecorder,
    clock: Arc<dyn Clock>,
}

impl DiskCache {
    /// Construct a cache rooted at `config.directory`, creating it if missing, loading existing
    /// metadata (treating missing/corrupt sidecars as empty, logging a warning), and spawning a
    /// detached background task to purge already-expired entries.
    pub async fn new(config: DiskConfig) -> anyhow::Result<Arc<Self>> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: DiskConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.directory).await?;

        let access_times = load_sidecar(&config.directory.join("access_times.json")).await;
        let creation_times = load_sidecar(&config.directory.join("creation_times.json")).await;

        let cache = Arc::new(Self {
            config,
            metadata: Mutex::new(Metadata {
                access_times,
                creation_times,
            }),
            stats: StatsRecorder::new(),
            clock,
        });

        let bg = Arc::clone(&cache);
        tokio::spawn(async move {
            if let Err(err) = bg.remove_expired().await {
                tracing::warn!(?err, "failed to purge expired disk cache entries at startup");
            }
        });

        Ok(cache)
    }

    fn img_path(&self, fp: &Fingerprint) -> PathBuf {
        self.config.directory.join(format!("{fp}.img"))
    }

    pub async fn get(&self, fp: &Fingerprint) -> Option<Arc<DecodedImage>> {
        let now = epoch_secs(self.clock.now());

        {
            let meta = self.metadata.lock().await;
            if let Some(max_age) = self.config.max_age {
                if let Some(&created) = meta.creation_times.get(fp.as_str()) {
                    if now - created > max_age.as_secs_f64() {
                        drop(meta);
                        self.remove(fp).await;
                        self.stats.record_miss();
                        return None;
                    }
                }
            }
        }

        let path = self.img_path(fp);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                self.stats.record_miss();
                return None;
            }
        };

        let image = match DecodedImage::decode(&bytes) {
            Ok(image) => image,
            Err(_) => {
                tracing::warn!(fingerprint = %fp, "disk cache entry failed to decode, evicting");
                self.remove(fp).await;
                self.stats.record_miss();
                return None;
            }
        };

        {
            let mut meta = self.metadata.lock().await;
            meta.access_times.insert(fp.as_str().to_string(), now);
            self.persist(&meta).await.ok();
        }

        self.stats.record_hit();
        Some(Arc::new(image))
    }

    pub async fn put(&self, fp: &Fingerprint, image: &DecodedImage) -> Result<(), CacheError> {
        let bytes = image.to_jpeg_bytes(self.config.quality)?;
        let path = self.img_path(fp);
        atomic_write(&path, &bytes)
            .await
            .map_err(|e| CacheError::Unknown(e.to_string()))?;

        let now = epoch_secs(self.clock.now());
        {
            let mut meta = self.metadata.lock().await;
            meta.creation_times.insert(fp.as_str().to_string(), now);
            meta.access_times.insert(fp.as_str().to_string(), now);
            self.persist(&meta)
                .await
                .map_err(|e| CacheError::Unknown(e.to_string()))?;
        }

        self.evict_if_needed().await.ok();
        Ok(())
    }

    pub async fn remove(&self, fp: &Fingerprint) {
        let path = self.img_path(fp);
        tokio::fs::remove_file(&path).await.ok();
        let mut meta = self.metadata.lock().await;
        meta.access_times.remove(fp.as_str());
        meta.creation_times.remove(fp.as_str());
        self.persist(&meta).await.ok();
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        tokio::fs::remove_dir_all(&self.config.directory).await.ok();
        tokio::fs::create_dir_all(&self.config.directory).await?;
        let mut meta = self.metadata.lock().await;
        meta.access_times.clear();
        meta.creation_times.clear();
        self.persist(&meta).await?;
        Ok(())
    }

    pub async fn remove_expired(&self) -> anyhow::Result<()> {
        let Some(max_age) = self.config.max_age else {
            return Ok(());
        };
        let now = epoch_secs(self.clock.now());

        let expired: Vec<Fingerprint> = {
            let meta = self.metadata.lock().await;
            meta.creation_times
                .iter()
                .filter(|(_, &created)| now - created > max_age.as_secs_f64())
                .map(|(k, _)| Fingerprint::from_hex(k.as_str()))
                .collect()
        };

        for fp in expired {
            self.remove(&fp).await;
        }
        Ok(())
    }

    /// Sum of on-disk `.img` file sizes only (sidecar metadata excluded).
    pub async fn byte_size(&self) -> u64 {
        let meta = self.metadata.lock().await;
        let mut total = 0u64;
        for fp in meta.access_times.keys() {
            let path = self.config.directory.join(format!("{fp}.img"));
            if let Ok(md) = tokio::fs::metadata(&path).await {
                total += md.len();
            }
        }
        total
    }

    async fn evict_if_needed(&self) -> anyhow::Result<()> {
        let total = self.byte_size().await;
        if total <= self.config.max_disk_bytes {
            return Ok(());
        }

        let mut ordered: Vec<(String, f64)> = {
            let meta = self.metadata.lock().await;
            meta.access_times
                .iter()
                .map(|(k, &v)| (k.clone(), v))
                .collect()
        };
        // Oldest access time first; tie-break by ascending fingerprint for determinism.
        ordered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));

        let mut remaining = total;
        for (key, _) in ordered {
            if remaining <= self.config.max_disk_bytes {
                break;
            }
            let fp = Fingerprint::from_hex(key.as_str());
            let path = self.img_path(&fp);
            let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            self.remove(&fp).await;
            remaining = remaining.saturating_sub(size);
        }

        Ok(())
    }

    async fn persist(&self, meta: &Metadata) -> anyhow::Result<()> {
        write_sidecar(&self.config.directory.join("access_times.json"), &meta.access_times).await?;
        write_sidecar(
            &self.config.directory.join("creation_times.json"),
            &meta.creation_times,
        )
        .await?;
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }
}

async fn load_sidecar(path: &Path) -> BTreeMap<String, f64> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            tracing::warn!(?err, path = %path.display(), "corrupt cache metadata, treating as empty");
            BTreeMap::new()
        }),
        Err(_) => BTreeMap::new(),
    }
}

async fn write_sidecar(path: &Path, map: &BTreeMap<String, f64>) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(map)?;
    atomic_write(path, &bytes).await
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
