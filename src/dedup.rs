use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Vec<u8>>, CacheError>>>;

/// A table entry tagged with a generation id so a completing joiner can tell whether the slot it
/// started with is still the current occupant before removing it.
struct Entry {
    future: SharedFetch,
    generation: u64,
}

/// Guarantees at most one in-flight fetch per fingerprint. Concurrent callers for the same
/// fingerprint all observe the result of the single underlying fetch, whether it succeeds or
/// fails.
#[derive(Default)]
pub struct Deduplicator {
    in_flight: Mutex<HashMap<Fingerprint, Entry>>,
    next_generation: AtomicU64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fetch` for `fp`, or join an already-running fetch for the same fingerprint.
    ///
    /// The table lock is only ever held across the lookup-or-insert step, never across the
    /// awaited fetch itself, so a slow fetch never blocks unrelated fingerprints.
    ///
    /// A joiner only removes the table entry it originally found once the awaited future
    /// resolves, and only if that entry is still the current occupant (same generation). This
    /// matters because a slow joiner of an older fetch must not clobber a newer fetch that a
    /// later caller installed for the same fingerprint after the older one was torn down.
    pub async fn run<F, Fut>(&self, fp: Fingerprint, fetch: F) -> Result<Arc<Vec<u8>>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CacheError>> + Send + 'static,
    {
        let (shared, generation) = {
            let mut table = self.in_flight.lock();
            if let Some(existing) = table.get(&fp) {
                (existing.future.clone(), existing.generation)
            } else {
                let boxed: BoxFuture<'static, Result<Arc<Vec<u8>>, CacheError>> =
                    fetch().map(|res| res.map(Arc::new)).boxed();
                let shared = boxed.shared();
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                table.insert(
                    fp.clone(),
                    Entry {
                        future: shared.clone(),
                        generation,
                    },
                );
                (shared, generation)
            }
        };

        let result = shared.await;
        self.complete(&fp, generation);
        result
    }

    fn complete(&self, fp: &Fingerprint, generation: u64) {
        let mut table = self.in_flight.lock();
        if table.get(fp).is_some_and(|entry| entry.generation == generation) {
            table.remove(fp);
        }
    }

    /// Drop this fingerprint's table entry, if any, so a subsequent call starts a fresh fetch.
    ///
    /// This does not force a cancellation signal onto joiners already holding a clone of the
    /// shared future: `futures_util::future::Shared` has no cancellation primitive, and the
    /// underlying work keeps running to completion for them regardless of what this table holds.
    /// Only once every holder (including, normally, this table's own entry) drops its clone does
    /// the underlying future actually stop being polled. This is also why cancelling a prefetch
    /// job never disturbs a foreground joiner on the same fingerprint (see
    /// [`crate::prefetch::PrefetchRegistry::cancel`]).
    pub fn cancel(&self, fp: &Fingerprint) {
        self.in_flight.lock().remove(fp);
    }

    pub fn cancel_all(&self) {
        self.in_flight.lock().clear();
    }

    pub fn is_in_flight(&self, fp: &Fingerprint) -> bool {
        self.in_flight.lock().contains_key(fp)
    }
}
