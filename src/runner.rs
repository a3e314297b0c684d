//! The contract user code implements to be run as a command.

use crate::error::CommandError;
use crate::result::ResultSender;
use async_trait::async_trait;
use std::time::Duration;

/// A unit of work plus its degraded alternative and protection settings.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use std::time::Duration;
/// use stormwall::{CommandError, ResultSender, Runner};
///
/// struct Profile {
///     user: u64,
/// }
///
/// #[async_trait]
/// impl Runner for Profile {
///     type Output = String;
///     type Error = std::io::Error;
///
///     async fn run(&self, result: ResultSender<String, std::io::Error>) {
///         let _ = result.ok(format!("profile-{}", self.user));
///     }
///
///     async fn fallback(
///         &self,
///         _cause: CommandError<std::io::Error>,
///         result: ResultSender<String, std::io::Error>,
///     ) {
///         let _ = result.ok("anonymous".to_string());
///     }
///
///     fn pool_name(&self) -> &str {
///         "profiles"
///     }
///
///     fn timeout(&self) -> Duration {
///         Duration::from_millis(250)
///     }
/// }
/// ```
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform the work and write exactly one result.
    ///
    /// Runs on its own task. If it outlives [`timeout`](Runner::timeout) it
    /// keeps running, but whatever it writes is discarded.
    async fn run(&self, result: ResultSender<Self::Output, Self::Error>);

    /// Produce a degraded result after `cause` prevented or failed the run.
    ///
    /// The command waits for this write without a deadline unless the command
    /// was built with
    /// [`with_fallback_timeout`](crate::Command::with_fallback_timeout).
    async fn fallback(
        &self,
        cause: CommandError<Self::Error>,
        result: ResultSender<Self::Output, Self::Error>,
    );

    /// Name of the shared bulkhead and breaker this runner's calls go through.
    fn pool_name(&self) -> &str;

    /// How long the command waits for [`run`](Runner::run) to deliver.
    fn timeout(&self) -> Duration;
}
