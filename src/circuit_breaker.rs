//! Circuit breaker consulted before every admission attempt.
//!
//! The command core only needs a boolean gate and two recording hooks, captured
//! by the [`CircuitBreaker`] trait. [`RollingCircuitBreaker`] is the default
//! implementation: a lock-free rolling window of success/failure buckets that
//! trips on error percentage once enough traffic has been seen, and lets a
//! single probe through after a cool-down.

use crate::clock::{Clock, MonotonicClock};
use crate::error::CircuitBreakerError;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Gate and outcome hooks the command core needs from a breaker.
///
/// Implementations are shared by every command on a pool, so all three methods
/// are called concurrently and must never block.
pub trait CircuitBreaker: Send + Sync + std::fmt::Debug {
    /// `true` when calls should be short-circuited to their fallback.
    fn is_open(&self) -> bool;
    /// Record a completed attempt that succeeded.
    fn mark_success(&self);
    /// Record a completed attempt that failed or timed out.
    fn mark_failure(&self);

    /// Side-effect-free state for inspection; `None` if the breaker does not track one.
    fn current_state(&self) -> Option<CircuitState> {
        None
    }

    /// Force the breaker closed. No-op unless the implementation supports it.
    fn reset(&self) {}
}

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are short-circuited until the sleep window elapses.
    Open,
    /// One probe call has been let through to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Validated configuration for [`RollingCircuitBreaker`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitBreakerConfig {
    error_threshold_percent: u8,
    request_volume_threshold: u64,
    window: Duration,
    buckets: usize,
    sleep_window: Duration,
}

impl Default for CircuitBreakerConfig {
    /// 50% errors over at least 20 requests in a 10s window (10 buckets), 5s sleep window.
    fn default() -> Self {
        Self {
            error_threshold_percent: 50,
            request_volume_threshold: 20,
            window: Duration::from_secs(10),
            buckets: 10,
            sleep_window: Duration::from_secs(5),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a config with the default 10s/10-bucket window, validating thresholds.
    pub fn new(
        error_threshold_percent: u8,
        request_volume_threshold: u64,
        sleep_window: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        let cfg = Self {
            error_threshold_percent,
            request_volume_threshold,
            sleep_window,
            ..Self::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override the rolling window and its bucket count.
    pub fn with_window(mut self, window: Duration, buckets: usize) -> Result<Self, CircuitBreakerError> {
        self.window = window;
        self.buckets = buckets;
        self.validate()?;
        Ok(self)
    }

    /// A breaker that records outcomes but never trips.
    pub fn disabled() -> Self {
        Self { request_volume_threshold: u64::MAX, ..Self::default() }
    }

    /// Failure percentage (1..=100) at or above which the breaker trips.
    pub fn error_threshold_percent(&self) -> u8 {
        self.error_threshold_percent
    }

    /// Minimum requests in the window before the error percentage counts.
    pub fn request_volume_threshold(&self) -> u64 {
        self.request_volume_threshold
    }

    /// Span of history considered when deciding to trip.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of slices the rolling window is divided into.
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Time to stay open before letting a probe through.
    pub fn sleep_window(&self) -> Duration {
        self.sleep_window
    }

    fn bucket_millis(&self) -> u64 {
        (self.window.as_millis() / self.buckets.max(1) as u128) as u64
    }

    /// Check every field; deserialized configs should be validated before use.
    pub fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.error_threshold_percent == 0 || self.error_threshold_percent > 100 {
            return Err(CircuitBreakerError::InvalidErrorThreshold {
                provided: self.error_threshold_percent,
            });
        }
        if self.request_volume_threshold == 0 {
            return Err(CircuitBreakerError::InvalidVolumeThreshold { provided: 0 });
        }
        if self.window.as_millis() == 0 {
            return Err(CircuitBreakerError::InvalidWindow(self.window));
        }
        if self.buckets == 0 || self.window.as_millis() % self.buckets as u128 != 0 {
            return Err(CircuitBreakerError::InvalidBuckets {
                window: self.window,
                buckets: self.buckets,
            });
        }
        if self.sleep_window.as_millis() == 0 {
            return Err(CircuitBreakerError::InvalidSleepWindow(self.sleep_window));
        }
        Ok(())
    }
}

/// Successes and failures currently inside the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthCounts {
    pub successes: u64,
    pub failures: u64,
}

impl HealthCounts {
    /// Successes plus failures.
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Integer failure percentage; 0 when nothing has been recorded.
    pub fn error_percent(&self) -> u64 {
        match self.total() {
            0 => 0,
            total => self.failures * 100 / total,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    // epoch + 1 of the slice this bucket currently counts; 0 means never used
    stamp: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl Bucket {
    fn clear(&self) {
        self.stamp.store(0, Ordering::Release);
        self.successes.store(0, Ordering::Release);
        self.failures.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
struct BreakerState {
    state: AtomicU8,
    opened_or_probed_at: AtomicU64,
    buckets: Box<[Bucket]>,
}

/// Rolling-window circuit breaker built on atomics.
///
/// Clones share the same underlying state via `Arc`.
#[derive(Debug, Clone)]
pub struct RollingCircuitBreaker {
    state: Arc<BreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl RollingCircuitBreaker {
    /// Create a breaker from a config, validating it first.
    ///
    /// # Examples
    /// ```
    /// use stormwall::{CircuitBreaker, CircuitBreakerConfig, RollingCircuitBreaker};
    /// use std::time::Duration;
    /// let cfg = CircuitBreakerConfig::new(50, 20, Duration::from_secs(5)).unwrap();
    /// let breaker = RollingCircuitBreaker::new(cfg).unwrap();
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, CircuitBreakerError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Caller has already validated `config`.
    pub(crate) fn from_config(config: CircuitBreakerConfig) -> Self {
        let buckets = (0..config.buckets).map(|_| Bucket::default()).collect();
        Self {
            state: Arc::new(BreakerState {
                state: AtomicU8::new(STATE_CLOSED),
                opened_or_probed_at: AtomicU64::new(0),
                buckets,
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The validated configuration this breaker runs with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without side effects.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.state.load(Ordering::Acquire))
    }

    /// Counts inside the current rolling window.
    pub fn health(&self) -> HealthCounts {
        let current = self.epoch();
        let span = self.config.buckets as u64;
        self.state
            .buckets
            .iter()
            .filter_map(|b| {
                let stamp = b.stamp.load(Ordering::Acquire);
                // stamp is epoch + 1
                (stamp != 0 && stamp + span > current + 1 && stamp <= current + 1).then(|| {
                    HealthCounts {
                        successes: b.successes.load(Ordering::Acquire),
                        failures: b.failures.load(Ordering::Acquire),
                    }
                })
            })
            .fold(HealthCounts::default(), |acc, h| HealthCounts {
                successes: acc.successes + h.successes,
                failures: acc.failures + h.failures,
            })
    }

    /// Force the breaker closed and forget the window.
    pub fn reset(&self) {
        for bucket in self.state.buckets.iter() {
            bucket.clear();
        }
        self.state.opened_or_probed_at.store(0, Ordering::Release);
        self.state.state.store(STATE_CLOSED, Ordering::Release);
        tracing::info!("Circuit breaker reset → closed");
    }

    fn epoch(&self) -> u64 {
        self.clock.now_millis() / self.config.bucket_millis().max(1)
    }

    fn bucket(&self) -> &Bucket {
        let epoch = self.epoch();
        let bucket = &self.state.buckets[(epoch % self.config.buckets as u64) as usize];
        let stamp = bucket.stamp.load(Ordering::Acquire);
        if stamp != epoch + 1
            && bucket
                .stamp
                .compare_exchange(stamp, epoch + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // Increments racing this reset may be lost; the window is statistical.
            bucket.successes.store(0, Ordering::Release);
            bucket.failures.store(0, Ordering::Release);
        }
        bucket
    }

    fn trip(&self, from: CircuitState) -> bool {
        self.state.opened_or_probed_at.store(self.clock.now_millis(), Ordering::Release);
        self.state
            .state
            .compare_exchange(
                from.to_u8(),
                CircuitState::Open.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl CircuitBreaker for RollingCircuitBreaker {
    fn is_open(&self) -> bool {
        if self.state() == CircuitState::Closed {
            return false;
        }

        // Open or probing: let exactly one caller through per sleep window.
        let last = self.state.opened_or_probed_at.load(Ordering::Acquire);
        let now = self.clock.now_millis();
        let sleep = u64::try_from(self.config.sleep_window.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(last) < sleep {
            return true;
        }
        match self.state.opened_or_probed_at.compare_exchange(
            last,
            now,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.state.state.store(CircuitState::HalfOpen.to_u8(), Ordering::Release);
                tracing::info!("Circuit breaker → half-open");
                false
            }
            Err(_) => true,
        }
    }

    fn mark_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.bucket().successes.fetch_add(1, Ordering::AcqRel);
            }
            CircuitState::HalfOpen => {
                if self
                    .state
                    .state
                    .compare_exchange(
                        CircuitState::HalfOpen.to_u8(),
                        CircuitState::Closed.to_u8(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    for bucket in self.state.buckets.iter() {
                        bucket.clear();
                    }
                    tracing::info!("Circuit breaker → closed");
                }
            }
            // Late result from a call admitted before the trip.
            CircuitState::Open => {}
        }
    }

    fn mark_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.bucket().failures.fetch_add(1, Ordering::AcqRel);
                let health = self.health();
                if health.total() >= self.config.request_volume_threshold
                    && health.error_percent() >= u64::from(self.config.error_threshold_percent)
                    && self.trip(CircuitState::Closed)
                {
                    tracing::error!(
                        failures = health.failures,
                        total = health.total(),
                        error_percent = health.error_percent(),
                        threshold = self.config.error_threshold_percent,
                        "Circuit breaker → open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                if self.trip(CircuitState::HalfOpen) {
                    tracing::warn!("Circuit breaker: probe failed → open");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn current_state(&self) -> Option<CircuitState> {
        Some(self.state())
    }

    fn reset(&self) {
        RollingCircuitBreaker::reset(self)
    }
}
