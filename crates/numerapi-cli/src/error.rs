//! CLI-specific error types and mappings.
//!
//! Handlers return `anyhow::Result`; the entry point classifies the error
//! chain into a [`CliError`] to pick the exit code.

use numerapi_client::ApiError;
use numerapi_transfer::TransferError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CliError {
    /// Invalid arguments.
    #[error("Invalid arguments: {0}")]
    Usage(String),

    /// The API or a storage endpoint could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Local file error.
    #[error("IO error: {0}")]
    Io(String),

    /// Missing or rejected API keys.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The user interrupted a transfer.
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    /// - 130: Terminated by Ctrl-C
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Other(_) => 1,
            Self::Usage(_) => 2,        // EX_USAGE
            Self::Unavailable(_) => 69, // EX_UNAVAILABLE
            Self::Io(_) => 74,          // EX_IOERR
            Self::Auth(_) => 77,        // EX_NOPERM
            Self::Interrupted(_) => 130,
        }
    }

    /// Classify an error chain, using the outermost message for display.
    pub fn classify(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        for cause in err.chain() {
            if let Some(cli) = cause.downcast_ref::<Self>() {
                return cli.clone();
            }
            if let Some(api) = cause.downcast_ref::<ApiError>() {
                return Self::from_api(api, message);
            }
            if let Some(transfer) = cause.downcast_ref::<TransferError>() {
                return Self::from_transfer(transfer, message);
            }
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return Self::Io(message);
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::Usage(message);
            }
        }
        Self::Other(message)
    }

    fn from_api(err: &ApiError, message: String) -> Self {
        match err {
            _ if err.is_auth() => Self::Auth(message),
            ApiError::Network { .. } => Self::Unavailable(message),
            ApiError::InvalidUrl(_) => Self::Usage(message),
            ApiError::Transfer(transfer) => Self::from_transfer(transfer, message),
            _ => Self::Other(message),
        }
    }

    fn from_transfer(err: &TransferError, message: String) -> Self {
        match err {
            TransferError::TransientNetwork { .. } => Self::Unavailable(message),
            TransferError::NonRetryableRequest {
                status: 401 | 403, ..
            } => Self::Auth(message),
            TransferError::LocalFilesystem { .. }
            | TransferError::ArtifactInUse { .. }
            | TransferError::Integrity { .. } => Self::Io(message),
            TransferError::Cancelled { .. } => Self::Interrupted(message),
            TransferError::InvalidUrl(_) => Self::Usage(message),
            _ => Self::Other(message),
        }
    }
}
