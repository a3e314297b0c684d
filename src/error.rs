//! Error types for commands, pools and breakers.
use std::time::Duration;
use thiserror::Error;

/// Why a command's primary attempt was abandoned in favour of its fallback.
///
/// Every variant is handed to [`Runner::fallback`](crate::Runner::fallback);
/// none of them ever reaches the caller of `execute`/`queue` directly.
#[derive(Debug, Clone, Error)]
pub enum CommandError<E> {
    /// The pool's circuit breaker is open; the unit of work was not started.
    #[error("circuit open")]
    CircuitOpen { pool: String },
    /// Every executor of the pool was busy; the unit of work was not started.
    #[error("executor pool full")]
    PoolFull { pool: String, capacity: usize },
    /// The unit of work completed and reported this failure.
    #[error("{0}")]
    Execution(#[source] E),
    /// The unit of work did not deliver a result within its deadline.
    #[error("timeout")]
    Timeout { pool: String, timeout: Duration },
    /// The unit of work finished (or panicked) without writing a result.
    #[error("run finished without delivering a result")]
    Abandoned { pool: String },
}

impl<E> CommandError<E> {
    /// Check if the breaker short-circuited the attempt.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
    /// Check if the bulkhead rejected the attempt.
    pub fn is_pool_full(&self) -> bool {
        matches!(self, Self::PoolFull { .. })
    }
    /// Check if the attempt timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
    /// Check if the unit of work itself failed.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
    /// Check if the run ended without writing a result.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }
    /// Name of the pool the attempt ran against, when the variant records it.
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { pool }
            | Self::PoolFull { pool, .. }
            | Self::Timeout { pool, .. }
            | Self::Abandoned { pool } => Some(pool),
            Self::Execution(_) => None,
        }
    }
    /// Get the inner error if this is an `Execution` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Execution(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Execution(e) => Some(e),
            _ => None,
        }
    }
    /// Short reason label used in logs and telemetry.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::PoolFull { .. } => "pool_full",
            Self::Execution(_) => "execution",
            Self::Timeout { .. } => "timeout",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// The opt-in fallback deadline elapsed before the fallback wrote a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fallback did not complete within {limit:?}")]
pub struct FallbackTimeout {
    pub limit: Duration,
}

/// Invalid executor pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolConfigError {
    #[error("pool capacity must be > 0 (got {provided})")]
    ZeroCapacity { provided: usize },
    #[error("pool capacity must not exceed {max} (got {provided})")]
    CapacityTooLarge { provided: usize, max: usize },
    #[error(transparent)]
    Breaker(#[from] CircuitBreakerError),
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    #[error("error_threshold_percent must be within 1..=100 (got {provided})")]
    InvalidErrorThreshold { provided: u8 },
    #[error("request_volume_threshold must be > 0 (got {provided})")]
    InvalidVolumeThreshold { provided: u64 },
    #[error("rolling window must be > 0 (got {0:?})")]
    InvalidWindow(Duration),
    #[error("bucket count must be > 0 and divide the window into whole milliseconds (window {window:?}, buckets {buckets})")]
    InvalidBuckets { window: Duration, buckets: usize },
    #[error("sleep_window must be > 0 (got {0:?})")]
    InvalidSleepWindow(Duration),
}

/// Errors from [`PoolRegistry`](crate::PoolRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The pool already exists, so its configuration is fixed.
    #[error("pool '{name}' already exists; configure it before first use")]
    AlreadyCreated { name: String },
    /// No pool with that name has been created.
    #[error("pool '{name}' not found")]
    NotFound { name: String },
    #[error("invalid configuration for pool: {0}")]
    InvalidConfig(#[from] PoolConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::fmt;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn short_circuit_messages_are_stable() {
        let open: CommandError<DummyError> = CommandError::CircuitOpen { pool: "db".into() };
        let full: CommandError<DummyError> =
            CommandError::PoolFull { pool: "db".into(), capacity: 4 };
        let timeout: CommandError<DummyError> =
            CommandError::Timeout { pool: "db".into(), timeout: Duration::from_millis(50) };
        assert_eq!(open.to_string(), "circuit open");
        assert_eq!(full.to_string(), "executor pool full");
        assert_eq!(timeout.to_string(), "timeout");
    }

    #[test]
    fn execution_error_displays_inner_message_verbatim() {
        let err = CommandError::Execution(DummyError("boom"));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn predicates_cover_all_variants() {
        let open: CommandError<DummyError> = CommandError::CircuitOpen { pool: "a".into() };
        assert!(open.is_circuit_open() && !open.is_pool_full());
        let full: CommandError<DummyError> =
            CommandError::PoolFull { pool: "a".into(), capacity: 1 };
        assert!(full.is_pool_full() && !full.is_timeout());
        let timeout: CommandError<DummyError> =
            CommandError::Timeout { pool: "a".into(), timeout: Duration::from_secs(1) };
        assert!(timeout.is_timeout() && !timeout.is_execution());
        let abandoned: CommandError<DummyError> = CommandError::Abandoned { pool: "a".into() };
        assert!(abandoned.is_abandoned());
        let exec = CommandError::Execution(DummyError("x"));
        assert!(exec.is_execution());
        assert_eq!(exec.reason(), "execution");
        assert_eq!(full.reason(), "pool_full");
    }

    #[test]
    fn pool_name_and_inner_accessors() {
        let full: CommandError<DummyError> =
            CommandError::PoolFull { pool: "search".into(), capacity: 2 };
        assert_eq!(full.pool(), Some("search"));
        assert!(full.as_inner().is_none());

        let exec = CommandError::Execution(DummyError("inner"));
        assert!(exec.pool().is_none());
        assert_eq!(exec.as_inner(), Some(&DummyError("inner")));
        assert_eq!(exec.into_inner(), Some(DummyError("inner")));
    }

    #[test]
    fn config_errors_mention_offending_value() {
        let msg = PoolConfigError::ZeroCapacity { provided: 0 }.to_string();
        assert!(msg.contains("capacity"));
        let msg = CircuitBreakerError::InvalidErrorThreshold { provided: 120 }.to_string();
        assert!(msg.contains("120"));
        let msg = RegistryError::AlreadyCreated { name: "db".into() }.to_string();
        assert!(msg.contains("'db'"));
    }
}
