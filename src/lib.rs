#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Stormwall
//!
//! Command-style fault tolerance for calls to unreliable dependencies.
//!
//! Each call is a [`Command`] wrapping a user [`Runner`]. The command runs
//! against a named [`ExecutorPool`] that combines three protections:
//!
//! - **Bulkhead**: a fixed number of executors per dependency; a saturated
//!   pool rejects immediately instead of queueing.
//! - **Deadline**: the runner's timeout bounds how long the caller waits.
//! - **Circuit breaker**: a dependency that keeps failing is short-circuited
//!   until it has had time to recover.
//!
//! Whenever a protection trips, or the work itself fails, the runner's
//! fallback supplies the result instead. Callers always get exactly one
//! `Result` back and never see the protection machinery directly.
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use std::time::Duration;
//! use stormwall::{Command, CommandError, PoolRegistry, ResultSender, Runner};
//!
//! struct Lookup;
//!
//! #[async_trait]
//! impl Runner for Lookup {
//!     type Output = &'static str;
//!     type Error = std::io::Error;
//!
//!     async fn run(&self, result: ResultSender<&'static str, std::io::Error>) {
//!         let _ = result.err(std::io::Error::new(std::io::ErrorKind::Other, "upstream down"));
//!     }
//!
//!     async fn fallback(
//!         &self,
//!         _cause: CommandError<std::io::Error>,
//!         result: ResultSender<&'static str, std::io::Error>,
//!     ) {
//!         let _ = result.ok("cached");
//!     }
//!
//!     fn pool_name(&self) -> &str {
//!         "lookup"
//!     }
//!
//!     fn timeout(&self) -> Duration {
//!         Duration::from_millis(100)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = PoolRegistry::new();
//!     let value = Command::new(Lookup, &registry).execute().await;
//!     assert_eq!(value.unwrap(), "cached");
//! }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod command;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod result;
pub mod runner;
pub mod telemetry;

// Re-exports
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthCounts, RollingCircuitBreaker,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use command::Command;
pub use error::{
    CircuitBreakerError, CommandError, FallbackTimeout, PoolConfigError, RegistryError,
};
pub use pool::{Executor, ExecutorPool, PoolConfig, DEFAULT_POOL_CAPACITY};
pub use registry::{PoolRegistry, PoolRegistryBuilder, PoolSnapshot};
pub use result::{ResultReceiver, ResultSender};
pub use runner::Runner;
