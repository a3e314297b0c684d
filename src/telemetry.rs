//! Telemetry for command execution.
//!
//! Every command reports what happened to it as a [`CommandEvent`]. Events
//! flow into a sink, which is any `tower::Service<CommandEvent>`, so sinks
//! compose with ordinary tower combinators. Emission is best effort: a sink
//! that is not ready or fails never changes a command's result.
//!
//! ```rust
//! use stormwall::telemetry::{CommandEvent, MemorySink};
//! use tower::Service;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut sink = MemorySink::new();
//! let event = CommandEvent::TimedOut { pool: "db".into(), timeout: Duration::from_millis(50) };
//! sink.call(event.clone()).await.unwrap();
//! assert_eq!(sink.events(), vec![event]);
//! # }
//! ```

use futures::future::BoxFuture;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower_service::Service;

/// A telemetry sink that consumes command events.
pub trait TelemetrySink:
    tower::Service<CommandEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: CommandEvent)
where
    S: tower::Service<CommandEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

/// What happened to one command.
///
/// An attempt produces one of `Succeeded`, `Failed`, `TimedOut`,
/// `ShortCircuited` or `Rejected`; anything but `Succeeded` is followed by
/// `FallbackSucceeded` or `FallbackFailed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// The run delivered a success value in time.
    Succeeded { pool: String, duration: Duration },
    /// The run delivered an error, or ended without delivering anything.
    Failed { pool: String, duration: Duration },
    /// The run missed its deadline.
    TimedOut { pool: String, timeout: Duration },
    /// The breaker was open; nothing ran.
    ShortCircuited { pool: String },
    /// Every executor was busy; nothing ran.
    Rejected { pool: String, capacity: usize },
    /// The fallback wrote a success value.
    FallbackSucceeded { pool: String, reason: &'static str },
    /// The fallback wrote an error (or missed its optional deadline).
    FallbackFailed { pool: String, reason: &'static str },
}

impl CommandEvent {
    /// Pool the event belongs to.
    pub fn pool(&self) -> &str {
        match self {
            CommandEvent::Succeeded { pool, .. }
            | CommandEvent::Failed { pool, .. }
            | CommandEvent::TimedOut { pool, .. }
            | CommandEvent::ShortCircuited { pool }
            | CommandEvent::Rejected { pool, .. }
            | CommandEvent::FallbackSucceeded { pool, .. }
            | CommandEvent::FallbackFailed { pool, .. } => pool,
        }
    }
}

impl fmt::Display for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEvent::Succeeded { pool, duration } => {
                write!(f, "{}::Succeeded(duration={:?})", pool, duration)
            }
            CommandEvent::Failed { pool, duration } => {
                write!(f, "{}::Failed(duration={:?})", pool, duration)
            }
            CommandEvent::TimedOut { pool, timeout } => {
                write!(f, "{}::TimedOut(timeout={:?})", pool, timeout)
            }
            CommandEvent::ShortCircuited { pool } => write!(f, "{}::ShortCircuited", pool),
            CommandEvent::Rejected { pool, capacity } => {
                write!(f, "{}::Rejected(capacity={})", pool, capacity)
            }
            CommandEvent::FallbackSucceeded { pool, reason } => {
                write!(f, "{}::FallbackSucceeded(reason={})", pool, reason)
            }
            CommandEvent::FallbackFailed { pool, reason } => {
                write!(f, "{}::FallbackFailed(reason={})", pool, reason)
            }
        }
    }
}

/// A no-op telemetry sink that discards all events. The default for commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Service<CommandEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = std::future::Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: CommandEvent) -> Self::Future {
        std::future::ready(Ok(()))
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate at INFO level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Service<CommandEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = std::future::Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: CommandEvent) -> Self::Future {
        tracing::info!(pool = event.pool(), event = %event, "command_event");
        std::future::ready(Ok(()))
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A bounded in-memory sink, mostly for tests. Oldest events are evicted first.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<CommandEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Creates a bounded memory sink (default cap: 10,000).
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Memory sink keeping at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a snapshot of all events received so far.
    pub fn events(&self) -> Vec<CommandEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drop every stored event.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    /// Returns the number of evicted events.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<CommandEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: CommandEvent) -> Self::Future {
        let mut guard = self.events.lock().unwrap();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(pool: &str) -> CommandEvent {
        CommandEvent::Rejected { pool: pool.into(), capacity: 1 }
    }

    #[tokio::test]
    async fn memory_sink_evicts_oldest() {
        let sink = MemorySink::with_capacity(2);
        for pool in ["a", "b", "c"] {
            emit_best_effort(sink.clone(), rejected(pool)).await;
        }
        let pools: Vec<_> = sink.events().iter().map(|e| e.pool().to_string()).collect();
        assert_eq!(pools, vec!["b", "c"]);
        assert_eq!(sink.evicted(), 1);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn null_and_log_sinks_accept_events() {
        emit_best_effort(NullSink, rejected("x")).await;
        emit_best_effort(LogSink, CommandEvent::ShortCircuited { pool: "x".into() }).await;
    }

    #[tokio::test]
    async fn failing_sink_is_swallowed() {
        #[derive(Clone)]
        struct Fails;

        impl Service<CommandEvent> for Fails {
            type Response = ();
            type Error = std::io::Error;
            type Future = std::future::Ready<Result<(), Self::Error>>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "not ready")))
            }

            fn call(&mut self, _req: CommandEvent) -> Self::Future {
                std::future::ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
            }
        }

        emit_best_effort(Fails, rejected("x")).await;
    }

    #[test]
    fn display_includes_pool_and_details() {
        let event = CommandEvent::FallbackFailed { pool: "db".into(), reason: "timeout" };
        assert_eq!(event.to_string(), "db::FallbackFailed(reason=timeout)");
        let event = CommandEvent::Rejected { pool: "db".into(), capacity: 4 };
        assert_eq!(event.to_string(), "db::Rejected(capacity=4)");
    }
}
