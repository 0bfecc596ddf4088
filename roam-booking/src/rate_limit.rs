use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use roam_core::{Clock, RateWindowStore};

use crate::store_call;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Time until the oldest request in the window expires. Set only on denial.
    pub retry_after: Option<Duration>,
    /// Requests seen in the current window, including this one.
    pub count: u64,
}

impl RateDecision {
    fn allow(count: u64) -> Self {
        Self { allowed: true, retry_after: None, count }
    }
}

/// Sliding-window log limiter over a shared [`RateWindowStore`].
pub struct RateLimiter {
    store: Arc<dyn RateWindowStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateWindowStore>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self { store, clock, timeout }
    }

    pub async fn allow(
        &self,
        route_id: &str,
        client_key: &str,
        max_per_window: u64,
        window: Duration,
    ) -> RateDecision {
        let key = format!("{}:{}", route_id, client_key);
        let now = self.clock.now();

        let snapshot = match store_call(self.timeout, self.store.record(&key, now, window)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Fail open: availability over strict limiting.
                warn!("Rate limiter store failed for {}; allowing request: {}", key, e);
                return RateDecision::allow(0);
            }
        };

        if snapshot.count <= max_per_window {
            return RateDecision::allow(snapshot.count);
        }

        let retry_after = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| snapshot.oldest.checked_add_signed(w))
            .map(|expires| (expires - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(window);
        debug!("Rate limit hit for {} ({} in window)", key, snapshot.count);

        RateDecision {
            allowed: false,
            retry_after: Some(retry_after),
            count: snapshot.count,
        }
    }
}
