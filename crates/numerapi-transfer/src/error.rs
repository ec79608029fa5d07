//! Transfer error taxonomy.
//!
//! Every failure the engine can report carries enough structure (status code,
//! OS error, attempt count) for a caller to decide whether to retry at a
//! higher level.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors surfaced by the transfer engine.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connection failures or 5xx responses that outlived the retry policy.
    #[error("transient network failure after {attempts} attempt(s): {message}")]
    TransientNetwork {
        /// Total attempts made, including the first.
        attempts: u32,
        /// Last HTTP status observed, if a response was received.
        status: Option<u16>,
        /// Last response body or connection error description.
        message: String,
    },

    /// The server rejected the request itself (bad auth, expired URL, not found).
    #[error("request rejected with status {status} for {url}: {body}")]
    NonRetryableRequest {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
        /// The URL that was requested, without its query string.
        url: String,
    },

    /// The finished transfer does not have the expected size.
    #[error("size mismatch: expected {expected} bytes, got {actual} (kept at {})", artifact.display())]
    Integrity {
        /// Size the caller said the file should have.
        expected: u64,
        /// Size actually written.
        actual: u64,
        /// Where the unverified bytes were left.
        artifact: PathBuf,
    },

    /// Local file could not be created, written or renamed.
    #[error("{operation} failed for {}: {source}", path.display())]
    LocalFilesystem {
        /// What was being done (e.g. "rename").
        operation: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Another writer holds the lock on the temporary artifact.
    #[error("temporary artifact {} is in use by another transfer", path.display())]
    ArtifactInUse {
        /// The lock file that could not be acquired.
        path: PathBuf,
    },

    /// The caller cancelled the transfer between chunks.
    #[error("transfer cancelled after {bytes_transferred} bytes")]
    Cancelled {
        /// Bytes written (download) or sent (upload) before cancelling.
        bytes_transferred: u64,
    },

    /// The server answered with a body we could not decode.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with it.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TransferError {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn filesystem(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::LocalFilesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Build a non-retryable error, stripping any pre-signed query string from the URL.
    pub fn rejected(status: u16, body: impl Into<String>, url: &url::Url) -> Self {
        Self::NonRetryableRequest {
            status,
            body: body.into(),
            url: redact_url(url),
        }
    }

    /// HTTP status attached to this error, if any.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::TransientNetwork { status, .. } => *status,
            Self::NonRetryableRequest { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Number of network attempts made before giving up, when known.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::TransientNetwork { attempts, .. } => Some(*attempts),
            Self::NonRetryableRequest { .. } => Some(1),
            _ => None,
        }
    }

    /// Whether retrying the whole operation later could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. } | Self::Cancelled { .. })
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Drop the query string: pre-signed URLs carry credentials there.
pub(crate) fn redact_url(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_strips_signature_from_url() {
        let url = url::Url::parse("https://bucket.s3.amazonaws.com/live.parquet?X-Amz-Signature=abc")
            .unwrap();
        let err = TransferError::rejected(403, "expired", &url);
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("live.parquet"));
        assert!(!msg.contains("X-Amz-Signature"));
    }

    #[test]
    fn status_and_attempts() {
        let err = TransferError::TransientNetwork {
            attempts: 3,
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.attempts(), Some(3));
        assert!(err.is_retryable());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TransferError::filesystem("rename", "/data/live.parquet", io);
        assert_eq!(err.status_code(), None);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("rename"));
    }

    #[test]
    fn integrity_message_names_artifact() {
        let err = TransferError::Integrity {
            expected: 10,
            actual: 7,
            artifact: PathBuf::from("/tmp/live.parquet.partial"),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 10"));
        assert!(msg.contains("live.parquet.partial"));
    }
}
