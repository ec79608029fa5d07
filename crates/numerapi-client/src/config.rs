//! Public configuration for the tournament client.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use numerapi_transfer::{ExponentialBackoff, RetryPolicy, TransferConfig};
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;

/// Default GraphQL endpoint.
pub const DEFAULT_API_URL: &str = "https://api-tournament.numer.ai";

/// Environment variable naming the compute node, forwarded on uploads.
pub const COMPUTE_ID_VAR: &str = "NUMERAI_COMPUTE_ID";

/// Environment variable naming the compute trigger, forwarded on submissions.
pub const TRIGGER_ID_VAR: &str = "TRIGGER_ID";

/// Which competition the client talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tournament {
    /// The main tournament.
    #[default]
    Classic,
    /// Numerai Signals.
    Signals,
}

impl Tournament {
    /// Numeric id used by the API.
    pub const fn id(self) -> u32 {
        match self {
            Self::Classic => 8,
            Self::Signals => 11,
        }
    }
}

impl fmt::Display for Tournament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => f.write_str("classic"),
            Self::Signals => f.write_str("signals"),
        }
    }
}

/// Configuration for [`crate::NumerApi`].
///
/// # Example
///
/// ```
/// use numerapi_client::{ClientConfig, Credentials, Tournament};
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_credentials(Credentials::new("PUBLIC", "SECRET"))
///     .with_tournament(Tournament::Signals)
///     .with_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// GraphQL endpoint
    pub(crate) api_url: String,
    /// User agent string for API requests
    pub(crate) user_agent: String,
    /// Whole-request timeout for queries
    pub(crate) timeout: Duration,
    /// API keys, if any
    pub(crate) credentials: Option<Credentials>,
    /// Retry policy for queries
    pub(crate) query_retry: RetryPolicy,
    /// Engine settings for dataset downloads and prediction uploads
    pub(crate) transfer: TransferConfig,
    /// Tournament used by round, model and submission calls
    pub(crate) tournament: Tournament,
    /// Directory dataset downloads default to
    pub(crate) data_dir: PathBuf,
    /// Sent as `x_compute_id` on uploads
    pub(crate) compute_id: Option<String>,
    /// Passed to submission mutations
    pub(crate) trigger_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: concat!("numerapi-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(600),
            credentials: None,
            query_retry: RetryPolicy::new(3)
                .with_backoff(ExponentialBackoff::new(Duration::from_secs(5))),
            transfer: TransferConfig::default(),
            tournament: Tournament::Classic,
            data_dir: PathBuf::from("."),
            compute_id: None,
            trigger_id: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus credentials, compute id and trigger id from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ClientConfig::from_env`], reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            credentials: Credentials::from_lookup(&lookup),
            compute_id: non_empty(COMPUTE_ID_VAR),
            trigger_id: non_empty(TRIGGER_ID_VAR),
            ..Self::default()
        }
    }

    /// Set the GraphQL endpoint.
    ///
    /// Defaults to `https://api-tournament.numer.ai`.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the user agent for API requests.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the query timeout.
    ///
    /// Defaults to 600 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use these API keys.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the retry policy for queries.
    ///
    /// Defaults to 3 attempts, waiting 5s then 10s.
    #[must_use]
    pub fn with_query_retry(mut self, retry: RetryPolicy) -> Self {
        self.query_retry = retry;
        self
    }

    /// Set the transfer engine configuration.
    #[must_use]
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    /// Select the tournament.
    #[must_use]
    pub const fn with_tournament(mut self, tournament: Tournament) -> Self {
        self.tournament = tournament;
        self
    }

    /// Directory dataset downloads land in when no destination is given.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Forward this compute id on uploads.
    #[must_use]
    pub fn with_compute_id(mut self, compute_id: impl Into<String>) -> Self {
        self.compute_id = Some(compute_id.into());
        self
    }

    /// Pass this trigger id to submission mutations.
    #[must_use]
    pub fn with_trigger_id(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    /// Configured credentials.
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Configured tournament.
    pub const fn tournament(&self) -> Tournament {
        self.tournament
    }

    /// Default download directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Transfer engine configuration.
    pub const fn transfer(&self) -> &TransferConfig {
        &self.transfer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{PUBLIC_ID_VAR, SECRET_KEY_VAR};

    #[test]
    fn test_default_config() {
        let config = ClientConfig::new();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.query_retry.max_attempts(), 3);
        assert_eq!(config.query_retry.delay(1), Duration::from_secs(5));
        assert_eq!(config.query_retry.delay(2), Duration::from_secs(10));
        assert_eq!(config.tournament(), Tournament::Classic);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn tournament_ids() {
        assert_eq!(Tournament::Classic.id(), 8);
        assert_eq!(Tournament::Signals.id(), 11);
        assert_eq!(Tournament::Signals.to_string(), "signals");
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = ClientConfig::from_lookup(|name| match name {
            PUBLIC_ID_VAR => Some("pub".to_string()),
            SECRET_KEY_VAR => Some("sec".to_string()),
            COMPUTE_ID_VAR => Some("node-1".to_string()),
            TRIGGER_ID_VAR => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.credentials(), Some(&Credentials::new("pub", "sec")));
        assert_eq!(config.compute_id.as_deref(), Some("node-1"));
        assert_eq!(config.trigger_id, None);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new()
            .with_api_url("http://localhost:1234")
            .with_tournament(Tournament::Signals)
            .with_data_dir("/data")
            .with_trigger_id("t-1");
        assert_eq!(config.api_url, "http://localhost:1234");
        assert_eq!(config.tournament(), Tournament::Signals);
        assert_eq!(config.data_dir(), Path::new("/data"));
        assert_eq!(config.trigger_id.as_deref(), Some("t-1"));
    }
}
