//! Convenient re-exports for writing runners and issuing commands.
pub use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    command::Command,
    error::{CommandError, FallbackTimeout},
    pool::PoolConfig,
    registry::PoolRegistry,
    result::{ResultReceiver, ResultSender},
    runner::Runner,
    telemetry::{CommandEvent, LogSink, MemorySink, NullSink},
};
pub use async_trait::async_trait;
