#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod artifact;
mod backend;
mod config;
mod engine;
mod error;
mod progress;
mod request;
mod retry;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// ============================================================================
// Public API
// ============================================================================

// Engine
pub use engine::TransferEngine;

// Configuration
pub use config::TransferConfig;
pub use retry::{
    AttemptError, BackoffStrategy, Decision, ExponentialBackoff, FixedBackoff, NoBackoff,
    Retrier, RetryPolicy, RetryState,
};

// Requests
pub use request::{
    DownloadRequest, TransferControl, UploadAck, UploadMethod, UploadRequest, UploadSource,
};

// Progress
pub use progress::{ProgressCadence, ProgressStream, ProgressThrottle, TransferProgress};

// Artifacts
pub use artifact::{LOCK_SUFFIX, PARTIAL_SUFFIX, TemporaryArtifact, lock_path_for, partial_path_for};

// Backend
pub use backend::{
    ByteStream, ContentRange, FetchResponse, OutgoingUpload, ReqwestBackend, SendResponse,
    TransferBackend, UploadStream,
};

// Errors
pub use error::{TransferError, TransferResult};

// Silence unused dev-dependency warnings
#[cfg(test)]
use httpmock as _;
