use crate::config::validate_proxy_strategy;
use crate::proxy::{ProxyDescriptor, ProxyStrategy};
use crate::ConfigError;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A proxy handed to a worker, remembered together with its pool index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyLease {
    pub index: usize,
    pub proxy: ProxyDescriptor,
}

#[derive(Debug, Default)]
struct RotationState {
    current: usize,
    should_rotate: bool,
    batches_started: u64,
}

/// Chooses a proxy per request or per batch according to a strategy
///
/// One allocator is created per processor run and shared by all of its
/// workers through the run context.
#[derive(Debug)]
pub struct ProxyAllocator {
    strategy: ProxyStrategy,
    pool: Vec<ProxyDescriptor>,
    cooldown: Duration,
    state: Mutex<RotationState>,
}

impl ProxyAllocator {
    /// Creates an allocator over a static pool
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError::EmptyProxyPool)` - A rotation strategy was selected
    ///   with no proxies configured
    pub fn new(
        strategy: ProxyStrategy,
        pool: Vec<ProxyDescriptor>,
        cooldown: Duration,
    ) -> Result<Self, ConfigError> {
        validate_proxy_strategy(strategy, pool.len())?;

        if strategy == ProxyStrategy::Concurrency && pool.is_empty() {
            tracing::warn!("Concurrency proxy strategy selected with an empty pool; using direct connections");
        }

        Ok(Self {
            strategy,
            pool,
            cooldown,
            state: Mutex::new(RotationState::default()),
        })
    }

    pub fn strategy(&self) -> ProxyStrategy {
        self.strategy
    }

    /// Number of proxies that actually take part in allocation
    pub fn pool_size(&self) -> usize {
        match self.strategy {
            ProxyStrategy::None => 0,
            _ => self.pool.len(),
        }
    }

    /// Sleep applied before retrying on a rotated proxy
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Index of the sticky proxy used by the rotation strategies
    pub fn current_index(&self) -> usize {
        self.lock().current
    }

    fn lock(&self) -> MutexGuard<'_, RotationState> {
        // The state is two integers and a flag; a panic mid-update cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lease(&self, index: usize) -> ProxyLease {
        ProxyLease {
            index,
            proxy: self.pool[index].clone(),
        }
    }

    /// Marks the start of a batch
    ///
    /// `RotationPerBatch` advances the shared index here, once per batch and
    /// independent of failures. The first batch keeps index 0.
    pub fn begin_batch(&self) {
        if self.strategy != ProxyStrategy::RotationPerBatch {
            return;
        }

        let mut state = self.lock();
        if state.batches_started > 0 {
            state.current = (state.current + 1) % self.pool.len();
            tracing::debug!("Batch proxy rotated to index {}", state.current);
        }
        state.batches_started += 1;
    }

    /// Picks the proxy for the worker occupying `slot`
    pub fn assign(&self, slot: usize) -> Option<ProxyLease> {
        match self.strategy {
            ProxyStrategy::None => None,
            ProxyStrategy::Concurrency => {
                if self.pool.is_empty() {
                    None
                } else {
                    Some(self.lease(slot % self.pool.len()))
                }
            }
            ProxyStrategy::Rotation | ProxyStrategy::RotationPerBatch => {
                let index = self.lock().current;
                Some(self.lease(index))
            }
        }
    }

    /// Flags the sticky proxy for rotation after a retryable failure
    ///
    /// A report against a proxy that is no longer current is ignored, so
    /// concurrent failures on the same proxy cause a single advance.
    pub fn report_failure(&self, lease: &ProxyLease) {
        if self.strategy != ProxyStrategy::Rotation {
            return;
        }

        let mut state = self.lock();
        if state.current == lease.index {
            state.should_rotate = true;
        }
    }

    /// Returns the proxy to retry with after a failure on `lease`
    ///
    /// Under `Rotation` this advances (with wrap-around) when the flag is set
    /// and `lease` is still current; a stale lease simply picks up the proxy
    /// another worker already rotated to. Other strategies keep their lease.
    pub fn next_after_failure(&self, lease: &ProxyLease) -> ProxyLease {
        if self.strategy != ProxyStrategy::Rotation {
            return lease.clone();
        }

        let mut state = self.lock();
        if state.should_rotate && state.current == lease.index {
            state.current = (state.current + 1) % self.pool.len();
            state.should_rotate = false;
            tracing::info!(
                "Rotated proxy {} -> {}",
                lease.proxy,
                self.pool[state.current]
            );
        }
        let index = state.current;
        drop(state);
        self.lease(index)
    }

    /// Reports a failure on `lease` and returns the proxy to retry with
    pub fn rotate_after_failure(&self, lease: &ProxyLease) -> ProxyLease {
        self.report_failure(lease);
        self.next_after_failure(lease)
    }
}
