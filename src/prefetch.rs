use crate::fingerprint::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::task::AbortHandle;

/// Tracks background prefetch jobs by fingerprint so they can be cancelled by URL.
#[derive(Default)]
pub struct PrefetchRegistry {
    jobs: Mutex<HashMap<Fingerprint, AbortHandle>>,
}

impl PrefetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, fp: Fingerprint, handle: AbortHandle) {
        self.jobs.lock().insert(fp, handle);
    }

    /// Abort and forget the job for `fp`, if any. Aborting only tears down the prefetch task
    /// itself, not any shared in-flight download a foreground caller might still be joined to.
    pub fn cancel(&self, fp: &Fingerprint) {
        if let Some(handle) = self.jobs.lock().remove(fp) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let mut jobs = self.jobs.lock();
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
    }

    pub fn is_tracked(&self, fp: &Fingerprint) -> bool {
        self.jobs.lock().contains_key(fp)
    }
}
