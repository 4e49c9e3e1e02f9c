//! Bounded pool of concurrent in-flight RPC calls.
//!
//! Shared by every component that makes on-demand node calls (transaction
//! hydration, annotation fan-out, registry metadata reads). The streaming
//! subscriptions themselves do not go through the limiter.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Default number of concurrent in-flight RPC calls.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 50;

/// FIFO token pool. `submit` waits for a token, runs the future, and
/// releases the token on success, error, and timeout alike.
#[derive(Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max: usize,
}

impl RateLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Runs `fut` once a token is available. Submissions queue FIFO.
    pub async fn submit<T>(&self, fut: impl Future<Output = T>) -> T {
        // The semaphore is never closed while a limiter handle exists.
        let _permit = self.permits.acquire().await;
        fut.await
    }

    /// Tokens not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured pool size.
    pub fn capacity(&self) -> usize {
        self.max
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}
