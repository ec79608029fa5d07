//! Transfer engine configuration.

use std::time::Duration;

use crate::progress::ProgressCadence;
use crate::retry::RetryPolicy;

/// Configuration for the transfer engine.
///
/// Passed explicitly to [`crate::TransferEngine`]; there is no shared session.
///
/// # Example
///
/// ```
/// use numerapi_transfer::{ExponentialBackoff, RetryPolicy, TransferConfig};
/// use std::time::Duration;
///
/// let config = TransferConfig::new()
///     .with_retry(RetryPolicy::new(5).with_backoff(ExponentialBackoff::new(Duration::from_secs(1))))
///     .with_idle_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Retry policy applied to every download and upload.
    pub(crate) retry: RetryPolicy,
    /// Cadence for controls created through the engine.
    pub(crate) progress: ProgressCadence,
    /// User agent string for HTTP requests.
    pub(crate) user_agent: String,
    /// Time allowed to establish a connection.
    pub(crate) connect_timeout: Duration,
    /// Longest gap allowed between two received chunks.
    pub(crate) idle_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            progress: ProgressCadence::default(),
            user_agent: concat!("numerapi-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl TransferConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy.
    ///
    /// Defaults to 3 attempts with a fixed one second delay.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the progress cadence.
    #[must_use]
    pub const fn with_progress_cadence(mut self, cadence: ProgressCadence) -> Self {
        self.progress = cadence;
        self
    }

    /// Set the user agent string for HTTP requests.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the connect timeout.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle timeout between received chunks.
    ///
    /// Defaults to 10 minutes.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Retry policy in use.
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// User agent in use.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransferConfig::new();
        assert!(config.user_agent.starts_with("numerapi-rs/"));
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_builder_pattern() {
        let config = TransferConfig::new()
            .with_retry(RetryPolicy::new(7))
            .with_user_agent("test-agent")
            .with_connect_timeout(Duration::from_secs(5))
            .with_idle_timeout(Duration::from_secs(9));

        assert_eq!(config.retry.max_attempts(), 7);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(9));
    }
}
