//! Error types for tournament API operations.

use numerapi_transfer::TransferError;
use thiserror::Error;

/// Result type alias for tournament API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors from queries and the flows built on them.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The call needs API keys and none are configured.
    #[error("API keys required for this action")]
    MissingCredentials,

    /// The API answered with GraphQL errors.
    #[error("{}", messages.join("; "))]
    Graphql {
        /// Messages from the `errors` member.
        messages: Vec<String>,
    },

    /// The API answered with a non-retryable HTTP status.
    #[error("API request failed with status {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The API could not be reached, or kept failing, after every attempt.
    #[error("API unreachable after {attempts} attempt(s): {message}")]
    Network {
        /// Total attempts made
        attempts: u32,
        /// Last failure
        message: String,
    },

    /// The response does not have the expected shape.
    #[error("Invalid response from API: {message}")]
    InvalidResponse {
        /// Description of what was invalid
        message: String,
    },

    /// The configured endpoint is not a valid URL.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client construction failed.
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// A dataset download or prediction upload failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Translate a retry-policy failure of a query into the query taxonomy.
    pub(crate) fn from_query_failure(err: TransferError) -> Self {
        match err {
            TransferError::TransientNetwork {
                attempts,
                status: Some(status),
                message,
            } => Self::Network {
                attempts,
                message: format!("status {status}: {message}"),
            },
            TransferError::TransientNetwork {
                attempts, message, ..
            } => Self::Network { attempts, message },
            TransferError::NonRetryableRequest { status, body, .. } => Self::Http { status, body },
            other => Self::Transfer(other),
        }
    }

    /// Whether the failure came from missing or rejected credentials.
    pub const fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::Http { status: 401 | 403, .. }
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_messages_are_joined() {
        let err = ApiError::Graphql {
            messages: vec!["bad filename".to_string(), "no round".to_string()],
        };
        assert_eq!(err.to_string(), "bad filename; no round");
    }

    #[test]
    fn query_failures_are_translated() {
        let transient = ApiError::from_query_failure(TransferError::TransientNetwork {
            attempts: 3,
            status: Some(503),
            message: "unavailable".to_string(),
        });
        assert!(matches!(transient, ApiError::Network { attempts: 3, .. }));
        assert!(transient.to_string().contains("503"));

        let rejected = ApiError::from_query_failure(TransferError::NonRetryableRequest {
            status: 401,
            body: "unauthorized".to_string(),
            url: "https://api-tournament.numer.ai/".to_string(),
        });
        assert!(matches!(rejected, ApiError::Http { status: 401, .. }));
        assert!(rejected.is_auth());

        let cancelled = ApiError::from_query_failure(TransferError::Cancelled {
            bytes_transferred: 0,
        });
        assert!(matches!(cancelled, ApiError::Transfer(_)));
    }
}
