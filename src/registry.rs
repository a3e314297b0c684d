//! Registry of named executor pools.
//!
//! Commands find their bulkhead and breaker by the runner's pool name. The
//! registry guarantees one shared [`ExecutorPool`] per name for as long as the
//! registry lives. It is an ordinary value, cloned into whatever needs it, so
//! tests can build isolated registries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::circuit_breaker::{CircuitState, RollingCircuitBreaker};
use crate::clock::{Clock, MonotonicClock};
use crate::error::{PoolConfigError, RegistryError};
use crate::pool::{ExecutorPool, PoolConfig};
use tracing::{debug, warn};

/// Point-in-time view of one pool, for inspection and health endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolSnapshot {
    pub name: String,
    pub capacity: usize,
    pub available: usize,
    /// `None` for custom breakers that do not expose a state.
    pub breaker: Option<CircuitState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    pools: HashMap<String, Arc<ExecutorPool>>,
    configs: HashMap<String, PoolConfig>,
}

#[derive(Debug)]
struct RegistryInner {
    state: RwLock<RegistryState>,
    defaults: PoolConfig,
    clock: Arc<dyn Clock>,
}

/// Name → pool map shared by every command that uses it. Clones share the map.
#[derive(Clone, Debug)]
pub struct PoolRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    /// Registry whose pools get [`PoolConfig::default`] unless configured.
    pub fn new() -> Self {
        Self::from_parts(PoolConfig::default(), Arc::new(MonotonicClock::default()))
    }

    /// Start a [`PoolRegistryBuilder`] for custom defaults, pools or clock.
    pub fn builder() -> PoolRegistryBuilder {
        PoolRegistryBuilder::default()
    }

    fn from_parts(defaults: PoolConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                defaults,
                clock,
            }),
        }
    }

    /// The pool for `name`, created on first reference.
    ///
    /// Every call with the same name returns the same `Arc`, even when two
    /// callers race to create it.
    pub fn pool(&self, name: &str) -> Arc<ExecutorPool> {
        if let Some(pool) = self.get(name) {
            return pool;
        }

        let mut state = self.inner.state.write().expect("pool registry poisoned");
        if let Some(pool) = state.pools.get(name) {
            return pool.clone();
        }
        let config = state.configs.get(name).cloned().unwrap_or_else(|| self.inner.defaults.clone());
        let breaker = RollingCircuitBreaker::from_config(config.breaker().clone())
            .with_shared_clock(self.inner.clock.clone());
        let pool = Arc::new(ExecutorPool::from_validated(name, config.capacity(), Arc::new(breaker)));
        debug!(pool = name, capacity = config.capacity(), "created executor pool");
        state.pools.insert(name.to_string(), pool.clone());
        pool
    }

    /// Existing pool for `name`, without creating one.
    pub fn get(&self, name: &str) -> Option<Arc<ExecutorPool>> {
        let state = self.inner.state.read().expect("pool registry poisoned");
        state.pools.get(name).cloned()
    }

    /// Set the configuration `name` will be created with.
    ///
    /// Pools are never reconfigured once created, so this fails with
    /// [`RegistryError::AlreadyCreated`] after first use. Configuring a name
    /// twice before first use keeps the latest config.
    pub fn configure(&self, name: &str, config: PoolConfig) -> Result<(), RegistryError> {
        config.validate()?;
        let mut state = self.inner.state.write().expect("pool registry poisoned");
        if state.pools.contains_key(name) {
            return Err(RegistryError::AlreadyCreated { name: name.to_string() });
        }
        if state.configs.insert(name.to_string(), config).is_some() {
            warn!(pool = name, "pool configuration replaced before first use; last one wins");
        }
        Ok(())
    }

    /// Install a pool built by hand, e.g. around a custom breaker.
    pub fn insert(&self, pool: ExecutorPool) -> Result<Arc<ExecutorPool>, RegistryError> {
        let mut state = self.inner.state.write().expect("pool registry poisoned");
        if state.pools.contains_key(pool.name()) {
            return Err(RegistryError::AlreadyCreated { name: pool.name().to_string() });
        }
        let pool = Arc::new(pool);
        state.pools.insert(pool.name().to_string(), pool.clone());
        Ok(pool)
    }

    /// Force the named pool's breaker closed.
    pub fn reset_breaker(&self, name: &str) -> Result<(), RegistryError> {
        match self.get(name) {
            Some(pool) => {
                pool.breaker().reset();
                Ok(())
            }
            None => Err(RegistryError::NotFound { name: name.to_string() }),
        }
    }

    /// Snapshot all pools sorted by name.
    pub fn snapshot(&self) -> Vec<PoolSnapshot> {
        let state = self.inner.state.read().expect("pool registry poisoned");
        let mut entries: Vec<PoolSnapshot> = state
            .pools
            .values()
            .map(|pool| PoolSnapshot {
                name: pool.name().to_string(),
                capacity: pool.capacity(),
                available: pool.available(),
                breaker: pool.breaker().current_state(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of pools created so far.
    pub fn len(&self) -> usize {
        self.inner.state.read().expect("pool registry poisoned").pools.len()
    }

    /// `true` if no pool has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for a [`PoolRegistry`] with non-default pool settings or clock.
#[derive(Debug)]
pub struct PoolRegistryBuilder {
    defaults: PoolConfig,
    clock: Arc<dyn Clock>,
    configs: Vec<(String, PoolConfig)>,
}

impl Default for PoolRegistryBuilder {
    fn default() -> Self {
        Self {
            defaults: PoolConfig::default(),
            clock: Arc::new(MonotonicClock::default()),
            configs: Vec::new(),
        }
    }
}

impl PoolRegistryBuilder {
    /// Config for every pool not configured by name.
    pub fn default_config(mut self, config: PoolConfig) -> Self {
        self.defaults = config;
        self
    }

    /// Config for one named pool.
    pub fn pool(mut self, name: impl Into<String>, config: PoolConfig) -> Self {
        self.configs.push((name.into(), config));
        self
    }

    /// Clock for every breaker the registry creates.
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validate every config and build the registry.
    pub fn build(self) -> Result<PoolRegistry, PoolConfigError> {
        self.defaults.validate()?;
        let registry = PoolRegistry::from_parts(self.defaults, self.clock);
        {
            let mut state = registry.inner.state.write().expect("pool registry poisoned");
            for (name, config) in self.configs {
                config.validate()?;
                state.configs.insert(name, config);
            }
        }
        Ok(registry)
    }
}
