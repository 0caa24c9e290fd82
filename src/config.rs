use crate::disk::DiskConfig;
use crate::downloader::DownloadConfig;
use crate::memory::MemoryConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Aggregate, independently-overridable configuration for a [`crate::manager::CacheManager`].
#[derive(Debug, Clone, Default)]
pub struct CacheManagerConfig {
    pub memory: MemoryConfig,
    pub disk: DiskConfig,
    pub download: DownloadConfig,
}

impl CacheManagerConfig {
    pub fn builder() -> CacheManagerConfigBuilder {
        CacheManagerConfigBuilder::default()
    }

    /// Load overrides from a TOML file (e.g. `pixelcache.toml`), falling back to defaults for
    /// any field the file omits. Mirrors the application-config loading idiom of reading from
    /// the platform config directory via `dirs`, parsing with `toml`, and wrapping I/O errors
    /// with `anyhow::Context`.
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(raw).context("failed to parse config file")?;
        Ok(file.into_config())
    }

    /// The default config file location: `<config dir>/pixelcache.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pixelcache.toml"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    memory_max_cost_bytes: Option<usize>,
    memory_max_count: Option<usize>,
    disk_directory: Option<PathBuf>,
    disk_max_bytes: Option<u64>,
    disk_max_age_secs: Option<u64>,
    disk_quality: Option<u8>,
    download_max_retries: Option<u32>,
    download_retry_delay_ms: Option<u64>,
    download_timeout_secs: Option<u64>,
    download_max_concurrent: Option<usize>,
}

impl ConfigFile {
    fn into_config(self) -> CacheManagerConfig {
        let mut config = CacheManagerConfig::default();
        if let Some(v) = self.memory_max_cost_bytes {
            config.memory.max_memory_cost = v;
        }
        if let Some(v) = self.memory_max_count {
            config.memory.max_count = v;
        }
        if let Some(v) = self.disk_directory {
            config.disk.directory = v;
        }
        if let Some(v) = self.disk_max_bytes {
            config.disk.max_disk_bytes = v;
        }
        if let Some(v) = self.disk_max_age_secs {
            config.disk.max_age = if v == 0 { None } else { Some(Duration::from_secs(v)) };
        }
        if let Some(v) = self.disk_quality {
            config.disk.quality = v;
        }
        if let Some(v) = self.download_max_retries {
            config.download.max_retries = v;
        }
        if let Some(v) = self.download_retry_delay_ms {
            config.download.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.download_timeout_secs {
            config.download.timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.download_max_concurrent {
            config.download.max_concurrent = v;
        }
        config
    }
}

#[derive(Default)]
pub struct CacheManagerConfigBuilder {
    config: CacheManagerConfig,
}

impl CacheManagerConfigBuilder {
    pub fn max_memory_cost(mut self, bytes: usize) -> Self {
        self.config.memory.max_memory_cost = bytes;
        self
    }

    pub fn max_memory_count(mut self, count: usize) -> Self {
        self.config.memory.max_count = count;
        self
    }

    pub fn disk_directory(mut self, dir: PathBuf) -> Self {
        self.config.disk.directory = dir;
        self
    }

    pub fn max_disk_bytes(mut self, bytes: u64) -> Self {
        self.config.disk.max_disk_bytes = bytes;
        self
    }

    pub fn max_age(mut self, age: Option<Duration>) -> Self {
        self.config.disk.max_age = age;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.disk.quality = quality;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.download.max_retries = retries;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.download.max_concurrent = n;
        self
    }

    pub fn build(self) -> CacheManagerConfig {
        self.config
    }
}
