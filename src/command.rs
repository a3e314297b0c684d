//! Commands: one protected invocation of a [`Runner`].
//!
//! A command checks its pool's breaker, borrows an executor without waiting,
//! races the runner against its deadline, and hands every failure path to the
//! runner's fallback. Exactly one result comes out, either the run's success
//! or whatever the fallback wrote.
//!
//! ```rust
//! use async_trait::async_trait;
//! use std::time::Duration;
//! use stormwall::{Command, CommandError, PoolRegistry, ResultSender, Runner};
//!
//! struct Quote;
//!
//! #[async_trait]
//! impl Runner for Quote {
//!     type Output = u32;
//!     type Error = std::io::Error;
//!
//!     async fn run(&self, result: ResultSender<u32, std::io::Error>) {
//!         tokio::time::sleep(Duration::from_millis(200)).await;
//!         let _ = result.ok(42);
//!     }
//!
//!     async fn fallback(&self, cause: CommandError<std::io::Error>, result: ResultSender<u32, std::io::Error>) {
//!         assert!(cause.is_timeout());
//!         let _ = result.ok(0);
//!     }
//!
//!     fn pool_name(&self) -> &str {
//!         "quotes"
//!     }
//!
//!     fn timeout(&self) -> Duration {
//!         Duration::from_millis(20)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = PoolRegistry::new();
//! let price = Command::new(Quote, &registry).execute().await.unwrap();
//! assert_eq!(price, 0);
//! # }
//! ```

use crate::error::{CommandError, FallbackTimeout};
use crate::pool::ExecutorPool;
use crate::registry::PoolRegistry;
use crate::result::{self, ResultReceiver};
use crate::runner::Runner;
use crate::telemetry::{emit_best_effort, CommandEvent, NullSink, TelemetrySink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type FallbackBound<E> = (Duration, fn(FallbackTimeout) -> E);

/// One logical invocation of a runner against its named pool.
///
/// `execute` and `queue` consume the command, so each command runs once.
pub struct Command<R: Runner, S = NullSink> {
    runner: Arc<R>,
    pool: Arc<ExecutorPool>,
    sink: S,
    fallback_bound: Option<FallbackBound<R::Error>>,
}

impl<R: Runner, S> std::fmt::Debug for Command<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("pool", &self.pool.name())
            .field("timeout", &self.runner.timeout())
            .field("fallback_timeout", &self.fallback_bound.map(|(limit, _)| limit))
            .finish()
    }
}

impl<R: Runner> Command<R> {
    /// Bind `runner` to the pool named by `runner.pool_name()`, creating the
    /// pool in `registry` on first reference.
    pub fn new(runner: R, registry: &PoolRegistry) -> Self {
        Self::from_arc(Arc::new(runner), registry)
    }

    /// Like [`Command::new`] for a runner shared between many commands.
    pub fn from_arc(runner: Arc<R>, registry: &PoolRegistry) -> Self {
        let pool = registry.pool(runner.pool_name());
        Self { runner, pool, sink: NullSink, fallback_bound: None }
    }
}

impl<R: Runner, S> Command<R, S> {
    /// Report this command's events to `sink`.
    pub fn with_sink<S2>(self, sink: S2) -> Command<R, S2> {
        Command {
            runner: self.runner,
            pool: self.pool,
            sink,
            fallback_bound: self.fallback_bound,
        }
    }

    /// Stop waiting for the fallback after `limit` and deliver
    /// `Err(FallbackTimeout.into())` instead.
    ///
    /// Without this the fallback wait is unbounded: a fallback that never
    /// writes its result stalls the command forever.
    pub fn with_fallback_timeout(mut self, limit: Duration) -> Self
    where
        R::Error: From<FallbackTimeout>,
    {
        self.fallback_bound = Some((limit, <R::Error as From<FallbackTimeout>>::from));
        self
    }

    /// The pool this command runs against.
    pub fn pool(&self) -> &Arc<ExecutorPool> {
        &self.pool
    }
}

impl<R, S> Command<R, S>
where
    R: Runner,
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    /// Run to completion and return the final result, real or fallback.
    pub async fn execute(self) -> Result<R::Output, R::Error> {
        self.try_run().await
    }

    /// Start the command on its own task and return the receiver for its one result.
    ///
    /// Must be called from within a tokio runtime.
    pub fn queue(self) -> ResultReceiver<R::Output, R::Error> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let result = self.try_run().await;
            // The caller may have dropped the receiver; nobody is left to tell.
            let _ = tx.send(result);
        });
        ResultReceiver::new(rx)
    }

    async fn try_run(&self) -> Result<R::Output, R::Error> {
        let pool = self.pool.name();

        if self.pool.is_open() {
            debug!(pool, "circuit open; short-circuiting to fallback");
            self.emit(CommandEvent::ShortCircuited { pool: pool.to_string() }).await;
            return self.try_fallback(CommandError::CircuitOpen { pool: pool.to_string() }).await;
        }

        let Some(executor) = self.pool.acquire() else {
            let capacity = self.pool.capacity();
            warn!(pool, capacity, "executor pool full; rejecting");
            self.emit(CommandEvent::Rejected { pool: pool.to_string(), capacity }).await;
            return self
                .try_fallback(CommandError::PoolFull { pool: pool.to_string(), capacity })
                .await;
        };

        let timeout = self.runner.timeout();
        let started = Instant::now();
        let (sender, mut delivered) = result::channel();
        // Detached: on timeout the run keeps going and its write is discarded.
        let _run = executor.run(self.runner.clone(), sender);

        let outcome = tokio::select! {
            biased;
            outcome = &mut delivered => Some(outcome),
            _ = tokio::time::sleep(timeout) => None,
        };
        drop(delivered);
        let duration = started.elapsed();

        // The slot stays reserved through the fallback; it goes back to the
        // pool only once the final result is in hand.
        let result = match outcome {
            Some(Ok(Ok(value))) => {
                self.pool.breaker().mark_success();
                debug!(pool, ?duration, "command succeeded");
                self.emit(CommandEvent::Succeeded { pool: pool.to_string(), duration }).await;
                Ok(value)
            }
            Some(Ok(Err(error))) => {
                self.pool.breaker().mark_failure();
                debug!(pool, ?duration, error = %error, "command failed");
                self.emit(CommandEvent::Failed { pool: pool.to_string(), duration }).await;
                self.try_fallback(CommandError::Execution(error)).await
            }
            Some(Err(_)) => {
                self.pool.breaker().mark_failure();
                warn!(pool, ?duration, "run ended without delivering a result");
                self.emit(CommandEvent::Failed { pool: pool.to_string(), duration }).await;
                self.try_fallback(CommandError::Abandoned { pool: pool.to_string() }).await
            }
            None => {
                self.pool.breaker().mark_failure();
                warn!(pool, ?timeout, "command timed out");
                self.emit(CommandEvent::TimedOut { pool: pool.to_string(), timeout }).await;
                self.try_fallback(CommandError::Timeout { pool: pool.to_string(), timeout }).await
            }
        };
        self.pool.release(executor);
        result
    }

    async fn try_fallback(&self, cause: CommandError<R::Error>) -> Result<R::Output, R::Error> {
        let pool = self.pool.name();
        let reason = cause.reason();
        let (sender, delivered) = result::channel();
        let runner = self.runner.clone();
        let task = tokio::spawn(async move { runner.fallback(cause, sender).await });

        let delivered = match self.fallback_bound {
            None => delivered.await,
            Some((limit, into_error)) => match tokio::time::timeout(limit, delivered).await {
                Ok(delivered) => delivered,
                Err(_) => {
                    warn!(pool, reason, ?limit, "fallback did not complete in time");
                    self.emit(CommandEvent::FallbackFailed { pool: pool.to_string(), reason })
                        .await;
                    return Err(into_error(FallbackTimeout { limit }));
                }
            },
        };

        match delivered {
            Ok(result) => {
                let event = if result.is_ok() {
                    CommandEvent::FallbackSucceeded { pool: pool.to_string(), reason }
                } else {
                    CommandEvent::FallbackFailed { pool: pool.to_string(), reason }
                };
                self.emit(event).await;
                result
            }
            // No value of the runner's error type exists to report this, so
            // the failure travels as a panic, like any other panic in user code.
            Err(_) => match task.await {
                Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                _ => panic!("fallback for pool '{}' finished without delivering a result", pool),
            },
        }
    }

    async fn emit(&self, event: CommandEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}
