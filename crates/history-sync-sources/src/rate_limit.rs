use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Minimum spacing between consecutive remote calls.
///
/// Every request path goes through `acquire`, so the guard holds for the whole
/// process no matter which cursor is being fetched.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            clock,
        }
    }

    pub fn with_system_clock(min_interval: Duration) -> Self {
        Self::new(min_interval, Arc::new(SystemClock))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Rate limit: waiting {:?} before next request", wait);
                self.clock.sleep(wait).await;
            }
        }
        *last_call = Some(self.clock.now());
    }
}
