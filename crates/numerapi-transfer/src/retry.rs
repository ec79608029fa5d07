//! Retry policy for a single logical request.
//!
//! A request moves through `Idle -> Attempting -> {Success, Retrying, Failed}`.
//! Only server errors in the configured status range and connection-level
//! failures move it to `Retrying`; everything else fails on the spot. The delay
//! between attempts comes from a pluggable [`BackoffStrategy`].

use std::fmt;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::error::{TransferError, TransferResult, redact_url};

// ============================================================================
// Backoff
// ============================================================================

/// Computes how long to wait before a retry.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// Delay before retry number `retry` (1 for the first retry).
    fn delay(&self, retry: u32) -> Duration;
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }
}

/// Wait the same amount before every retry.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl BackoffStrategy for FixedBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        self.0
    }
}

/// Multiply the delay by `factor` on every retry, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor per retry.
    pub factor: u32,
    /// Upper bound for any single delay.
    pub max: Duration,
}

impl ExponentialBackoff {
    /// Exponential backoff starting at `base`, doubling, capped at five minutes.
    #[must_use]
    pub const fn new(base: Duration) -> Self {
        Self {
            base,
            factor: 2,
            max: Duration::from_secs(300),
        }
    }

    /// Set the growth factor.
    #[must_use]
    pub const fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = self.factor.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .map_or(self.max, |d| d.min(self.max))
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Immutable retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    retryable_statuses: RangeInclusive<u16>,
    backoff: Arc<dyn BackoffStrategy>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retryable_statuses: 500..=599,
            backoff: Arc::new(FixedBackoff(Duration::from_secs(1))),
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` total attempts with the default fixed delay.
    ///
    /// A value of zero is treated as one attempt.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replace the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Replace the range of statuses treated as transient.
    #[must_use]
    pub const fn with_retryable_statuses(mut self, statuses: RangeInclusive<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a response with this status should be retried.
    #[must_use]
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before retry number `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }

    /// Run `attempt` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// The closure receives the 1-based attempt number. `url` is only used to
    /// describe failures.
    pub async fn run<T, F, Fut>(&self, url: &Url, mut attempt: F) -> TransferResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut retrier = Retrier::new(self);
        loop {
            let n = retrier.begin();
            match attempt(n).await {
                Ok(value) => {
                    retrier.succeed();
                    return Ok(value);
                }
                Err(err) => match retrier.fail(&err) {
                    Decision::Retry(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Decision::GiveUp => return Err(retrier.into_error(err, url)),
                },
            }
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Why a single attempt did not succeed.
#[derive(Debug)]
pub enum AttemptError {
    /// The server answered with a non-success status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// No usable response: connect failure, reset, timeout, truncated body.
    Connection(String),
    /// A local failure that retrying cannot fix.
    Fatal(TransferError),
}

impl From<TransferError> for AttemptError {
    fn from(err: TransferError) -> Self {
        Self::Fatal(err)
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Connection(message) => write!(f, "connection error: {message}"),
            Self::Fatal(err) => err.fmt(f),
        }
    }
}

/// Where a request currently is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Nothing sent yet.
    Idle,
    /// Attempt number `attempt` is in flight.
    Attempting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Attempt `attempt` failed transiently; another one is allowed.
    Retrying {
        /// The attempt that just failed.
        attempt: u32,
    },
    /// Finished successfully.
    Success {
        /// Attempts used.
        attempts: u32,
    },
    /// Finished with an error.
    Failed {
        /// Attempts used.
        attempts: u32,
    },
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait this long, then attempt again.
    Retry(Duration),
    /// Stop and report the error.
    GiveUp,
}

/// Drives [`RetryState`] for one logical request.
#[derive(Debug)]
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    state: RetryState,
}

impl<'a> Retrier<'a> {
    /// Start in `Idle`.
    pub const fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
        }
    }

    /// Current state.
    pub const fn state(&self) -> RetryState {
        self.state
    }

    /// Attempts started so far.
    pub const fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Idle => 0,
            RetryState::Attempting { attempt } | RetryState::Retrying { attempt } => attempt,
            RetryState::Success { attempts } | RetryState::Failed { attempts } => attempts,
        }
    }

    /// Move to `Attempting` and return the new attempt number.
    pub fn begin(&mut self) -> u32 {
        let attempt = self.attempts() + 1;
        debug!(attempt, max_attempts = self.policy.max_attempts, "Starting attempt");
        self.state = RetryState::Attempting { attempt };
        attempt
    }

    /// Record success of the current attempt.
    pub fn succeed(&mut self) {
        self.state = RetryState::Success {
            attempts: self.attempts(),
        };
    }

    /// Record a failure of the current attempt and decide what comes next.
    pub fn fail(&mut self, err: &AttemptError) -> Decision {
        let attempt = self.attempts();
        let transient = match err {
            AttemptError::Status { status, .. } => self.policy.is_retryable_status(*status),
            AttemptError::Connection(_) => true,
            AttemptError::Fatal(_) => false,
        };

        if transient && attempt < self.policy.max_attempts {
            let delay = self.policy.delay(attempt);
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Transient failure, retrying"
            );
            self.state = RetryState::Retrying { attempt };
            Decision::Retry(delay)
        } else {
            debug!(attempt, error = %err, "Giving up");
            self.state = RetryState::Failed { attempts: attempt };
            Decision::GiveUp
        }
    }

    /// Convert the last attempt error into the error reported to the caller.
    pub fn into_error(self, err: AttemptError, url: &Url) -> TransferError {
        let attempts = self.attempts();
        match err {
            AttemptError::Status { status, body } if self.policy.is_retryable_status(status) => {
                TransferError::TransientNetwork {
                    attempts,
                    status: Some(status),
                    message: body,
                }
            }
            AttemptError::Status { status, body } => TransferError::rejected(status, body, url),
            AttemptError::Connection(message) => TransferError::TransientNetwork {
                attempts,
                status: None,
                message: format!("{message} ({})", redact_url(url)),
            },
            AttemptError::Fatal(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn url() -> Url {
        Url::parse("https://example.com/file").unwrap()
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .with_max(Duration::from_millis(350));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
        assert_eq!(backoff.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn state_machine_transitions() {
        let policy = RetryPolicy::new(2).with_backoff(NoBackoff);
        let mut retrier = Retrier::new(&policy);
        assert_eq!(retrier.state(), RetryState::Idle);

        assert_eq!(retrier.begin(), 1);
        let server_error = AttemptError::Status {
            status: 502,
            body: String::new(),
        };
        assert_eq!(retrier.fail(&server_error), Decision::Retry(Duration::ZERO));
        assert_eq!(retrier.state(), RetryState::Retrying { attempt: 1 });

        assert_eq!(retrier.begin(), 2);
        assert_eq!(retrier.fail(&server_error), Decision::GiveUp);
        assert_eq!(retrier.state(), RetryState::Failed { attempts: 2 });
    }

    #[test]
    fn client_errors_fail_immediately() {
        let policy = RetryPolicy::new(5).with_backoff(NoBackoff);
        let mut retrier = Retrier::new(&policy);
        retrier.begin();
        let decision = retrier.fail(&AttemptError::Status {
            status: 404,
            body: "missing".to_string(),
        });
        assert_eq!(decision, Decision::GiveUp);
        assert_eq!(retrier.state(), RetryState::Failed { attempts: 1 });
    }

    #[tokio::test]
    async fn run_retries_server_errors_up_to_max_attempts() {
        let policy = RetryPolicy::new(3).with_backoff(NoBackoff);
        let calls = AtomicU32::new(0);
        let result: TransferResult<()> = policy
            .run(&url(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Status {
                        status: 500,
                        body: "boom".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(TransferError::TransientNetwork {
                attempts, status, ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(status, Some(500));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_recovers_after_connection_errors() {
        let policy = RetryPolicy::new(3).with_backoff(NoBackoff);
        let result = policy
            .run(&url(), |attempt| async move {
                if attempt < 3 {
                    Err(AttemptError::Connection("reset by peer".to_string()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn run_does_not_retry_fatal_errors() {
        let policy = RetryPolicy::new(3).with_backoff(NoBackoff);
        let calls = AtomicU32::new(0);
        let result: TransferResult<()> = policy
            .run(&url(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(AttemptError::Fatal(TransferError::Cancelled {
                        bytes_transferred: 0,
                    }))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TransferError::Cancelled { .. })));
    }
}
