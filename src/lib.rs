//! A two-tier (memory + disk) image cache fronting a concurrent, deduplicating HTTP downloader.
//!
//! This crate never installs a global `tracing` subscriber or any other process-wide state on
//! its own — every component is constructed explicitly by the embedder. Wire up your own
//! `tracing_subscriber` (or enable the `test-logging` feature in tests) to see its `debug`/`warn`
//! events.

pub mod config;
pub mod dedup;
pub mod disk;
pub mod downloader;
pub mod error;
pub mod fingerprint;
pub mod image;
pub mod limiter;
pub mod manager;
pub mod memory;
pub mod notify;
pub mod prefetch;
pub mod stats;

pub use config::CacheManagerConfig;
pub use error::CacheError;
pub use fingerprint::Fingerprint;
pub use image::DecodedImage;
pub use manager::{CacheManager, LoadOptions};
pub use stats::Stats;

#[cfg(feature = "test-logging")]
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(fmt::layer().compact())
        .try_init();
}
