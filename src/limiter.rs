use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A FIFO counting semaphore admitting at most `max_concurrent` simultaneous operations.
///
/// Waiters are granted permits in arrival order; a permit is always released on every exit path
/// of `with_limit` (success, error, or the future being dropped/cancelled), since release is tied
/// to the permit guard's `Drop` impl rather than to the closure returning normally.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn with_limit<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        op().await
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn caps_concurrent_operations() {
        let limiter = ConcurrencyLimiter::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                limiter
                    .with_limit(|| async {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn releases_permit_on_panic_path() {
        let limiter = ConcurrencyLimiter::new(1);
        let _ = std::panic::AssertUnwindSafe(
            limiter.with_limit(|| async { panic!("boom") }),
        )
        .catch_unwind()
        .await;

        assert_eq!(limiter.available_permits(), 1);
    }
}
