use parking_lot::Mutex;
use std::sync::Arc;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// A process-wide subscribable memory-pressure signal.
///
/// This is the narrow interface to the OS-level memory-pressure bridge: something outside this
/// crate (the embedding application) is responsible for calling [`PressureSource::notify`] when
/// the platform reports memory pressure. [`crate::manager::CacheManager`] subscribes its memory
/// cache's `clear` to an optional `PressureSource` at construction time.
#[derive(Default, Clone)]
pub struct PressureSource {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

/// Detaches its listener when dropped.
pub struct Subscription {
    id: u64,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners.lock().retain(|(id, _)| *id != self.id);
    }
}

impl PressureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Invoke every currently-subscribed listener. Called by the embedder's OS-level bridge.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener();
        }
    }
}
