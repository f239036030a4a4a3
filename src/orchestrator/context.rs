use crate::config::RateLimitConfig;
use crate::orchestrator::metrics::RequestMetrics;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State shared by every worker of a run
///
/// Owned by the orchestrator and handed to workers explicitly; nothing here
/// lives in a global.
#[derive(Debug)]
pub struct RunContext {
    pub metrics: Arc<RequestMetrics>,
    pub cancel: CancellationToken,
    rate_limit: RateLimitConfig,
    item_cap: Option<usize>,
    claimed: AtomicUsize,
    cap_reached: AtomicBool,
    requests: AtomicU64,
}

impl RunContext {
    pub fn new(
        metrics: Arc<RequestMetrics>,
        cancel: CancellationToken,
        rate_limit: RateLimitConfig,
        item_cap: Option<usize>,
    ) -> Self {
        Self {
            metrics,
            cancel,
            rate_limit,
            item_cap,
            claimed: AtomicUsize::new(0),
            cap_reached: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        }
    }

    /// Reserves one item against the run cap
    ///
    /// Returns false once the run is cancelled or the cap is exhausted. The
    /// claim that reaches the cap cancels the run so idle workers stop
    /// pulling; work already claimed finishes normally.
    pub fn claim_item(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let Some(cap) = self.item_cap else {
            self.claimed.fetch_add(1, Ordering::SeqCst);
            return true;
        };

        let claimed = self
            .claimed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < cap).then_some(n + 1)
            });

        match claimed {
            Ok(previous) => {
                if previous + 1 >= cap {
                    self.reach_cap(cap);
                }
                true
            }
            Err(_) => {
                self.reach_cap(cap);
                false
            }
        }
    }

    fn reach_cap(&self, cap: usize) {
        if !self.cap_reached.swap(true, Ordering::SeqCst) {
            tracing::info!("Item cap of {} reached, stopping dispatch", cap);
        }
        self.cancel.cancel();
    }

    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::SeqCst)
    }

    pub fn cap_reached(&self) -> bool {
        self.cap_reached.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Applies request pacing before a navigation
    ///
    /// Every `sleep-every` requests the caller sleeps `sleep-ms`; on top of
    /// that each request sleeps a random `0..=jitter-ms`.
    pub async fn pace(&self) {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        if self.rate_limit.sleep_every > 0
            && self.rate_limit.sleep_ms > 0
            && n % self.rate_limit.sleep_every == 0
        {
            tracing::debug!("Pacing: sleeping {}ms after {} requests", self.rate_limit.sleep_ms, n);
            tokio::time::sleep(Duration::from_millis(self.rate_limit.sleep_ms)).await;
        }

        if self.rate_limit.jitter_ms > 0 {
            let jitter = rand::random_range(0..=self.rate_limit.jitter_ms);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }
}
