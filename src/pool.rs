//! Executor pools: the per-dependency bulkhead.
//!
//! A pool owns a fixed number of executor slots and one circuit breaker.
//! Admission is a non-blocking permit take on a `tokio::sync::Semaphore`;
//! a saturated pool answers `None` immediately instead of queueing the caller.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::PoolConfigError;
use crate::result::ResultSender;
use crate::runner::Runner;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Executors per pool when nothing else is configured.
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// Capacity and breaker settings for one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    capacity: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    breaker: CircuitBreakerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_POOL_CAPACITY, breaker: CircuitBreakerConfig::default() }
    }
}

impl PoolConfig {
    /// Pool of `capacity` executors with the default breaker.
    pub fn new(capacity: usize) -> Result<Self, PoolConfigError> {
        let cfg = Self { capacity, ..Self::default() };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replace the breaker settings.
    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Result<Self, PoolConfigError> {
        self.breaker = breaker;
        self.validate()?;
        Ok(self)
    }

    /// Number of executors the pool will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Breaker settings for the pool.
    pub fn breaker(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    /// Check capacity bounds and the breaker settings.
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.capacity == 0 {
            return Err(PoolConfigError::ZeroCapacity { provided: 0 });
        }
        if self.capacity > Semaphore::MAX_PERMITS {
            return Err(PoolConfigError::CapacityTooLarge {
                provided: self.capacity,
                max: Semaphore::MAX_PERMITS,
            });
        }
        self.breaker.validate()?;
        Ok(())
    }
}

/// A borrowed execution slot.
///
/// Dropping the executor returns the slot to its pool, so every exit path of
/// an attempt releases it exactly once.
#[derive(Debug)]
pub struct Executor {
    pool: Arc<str>,
    _permit: OwnedSemaphorePermit,
}

impl Executor {
    /// Name of the pool this slot belongs to.
    pub fn pool_name(&self) -> &str {
        &self.pool
    }

    /// Start `runner.run` on its own task, writing into `result`.
    ///
    /// The task is not tied to the executor's lifetime: if the caller gives up
    /// waiting, the work keeps going and its write lands in a closed channel.
    pub fn run<R: Runner>(
        &self,
        runner: Arc<R>,
        result: ResultSender<R::Output, R::Error>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { runner.run(result).await })
    }
}

/// Named, fixed-capacity set of executors plus the breaker guarding them.
#[derive(Debug)]
pub struct ExecutorPool {
    name: Arc<str>,
    capacity: usize,
    slots: Arc<Semaphore>,
    breaker: Arc<dyn CircuitBreaker>,
}

impl ExecutorPool {
    /// Build a pool around any breaker implementation.
    ///
    /// Pools are normally obtained from a [`PoolRegistry`](crate::PoolRegistry),
    /// which guarantees one instance per name.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Result<Self, PoolConfigError> {
        if capacity == 0 {
            return Err(PoolConfigError::ZeroCapacity { provided: 0 });
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(PoolConfigError::CapacityTooLarge {
                provided: capacity,
                max: Semaphore::MAX_PERMITS,
            });
        }
        Ok(Self::from_validated(name, capacity, breaker))
    }

    pub(crate) fn from_validated(
        name: impl Into<String>,
        capacity: usize,
        breaker: Arc<dyn CircuitBreaker>,
    ) -> Self {
        let name: String = name.into();
        Self { name: Arc::from(name), capacity, slots: Arc::new(Semaphore::new(capacity)), breaker }
    }

    /// Name the pool is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total executors, busy or not.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Executors not currently borrowed.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Executors currently borrowed.
    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Take a free executor, or `None` right away if all are busy.
    pub fn acquire(&self) -> Option<Executor> {
        let permit = self.slots.clone().try_acquire_owned().ok()?;
        Some(Executor { pool: self.name.clone(), _permit: permit })
    }

    /// Give an executor back. Equivalent to dropping it.
    pub fn release(&self, executor: Executor) {
        debug_assert_eq!(executor.pool_name(), self.name(), "executor returned to the wrong pool");
        drop(executor);
    }

    /// The breaker shared by every command on this pool.
    pub fn breaker(&self) -> &dyn CircuitBreaker {
        self.breaker.as_ref()
    }

    /// Admission pre-check: `true` if calls should skip straight to fallback.
    pub fn is_open(&self) -> bool {
        self.breaker.is_open()
    }
}
