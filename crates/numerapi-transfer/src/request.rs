//! Transfer requests, upload sources and per-call control.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{TransferError, TransferResult};
use crate::progress::{self, ProgressCadence, ProgressReporter, ProgressStream};

// ============================================================================
// Download
// ============================================================================

/// A file to fetch into a local destination.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub(crate) url: Url,
    pub(crate) destination: PathBuf,
    pub(crate) expected_size: Option<u64>,
    pub(crate) resume: bool,
    pub(crate) authorization: Option<String>,
}

impl DownloadRequest {
    /// Download `url` into `destination`.
    pub fn new(url: &str, destination: impl Into<PathBuf>) -> TransferResult<Self> {
        Ok(Self::from_url(Url::parse(url)?, destination))
    }

    /// Download an already-parsed URL into `destination`.
    pub fn from_url(url: Url, destination: impl Into<PathBuf>) -> Self {
        Self {
            url,
            destination: destination.into(),
            expected_size: None,
            resume: false,
            authorization: None,
        }
    }

    /// Verify the finished file has exactly this many bytes.
    #[must_use]
    pub const fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Continue from an existing partial artifact if there is one.
    #[must_use]
    pub const fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Send this value as the `Authorization` header.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Source URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Final destination path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Expected size, if known.
    pub const fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    /// Whether resuming was requested.
    pub const fn resume(&self) -> bool {
        self.resume
    }
}

// ============================================================================
// Upload
// ============================================================================

/// Bytes to upload.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Stream a local file.
    File(PathBuf),
    /// Send an in-memory buffer under the given file name.
    Buffer {
        /// File name reported to the server.
        file_name: String,
        /// Contents; cloning is cheap.
        bytes: Bytes,
    },
}

impl UploadSource {
    /// Upload a local file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Upload an in-memory buffer.
    pub fn buffer(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::Buffer {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Last path segment, or the buffer's file name.
    pub fn file_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Buffer { file_name, .. } => file_name.clone(),
        }
    }

    /// Size in bytes, reading file metadata if needed.
    pub async fn len(&self) -> TransferResult<u64> {
        match self {
            Self::File(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .map_err(|e| TransferError::filesystem("stat", path, e)),
            Self::Buffer { bytes, .. } => Ok(bytes.len() as u64),
        }
    }
}

/// How the bytes are sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadMethod {
    /// Raw body, as pre-signed object-store URLs expect.
    #[default]
    Put,
    /// `multipart/form-data` POST with the bytes under `field_name`.
    Post {
        /// Form field carrying the file.
        field_name: String,
    },
}

/// A local file or buffer to send to a remote endpoint.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub(crate) url: Url,
    pub(crate) source: UploadSource,
    pub(crate) method: UploadMethod,
    pub(crate) authorization: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
}

impl UploadRequest {
    /// PUT `source` to `url`.
    pub fn new(url: &str, source: UploadSource) -> TransferResult<Self> {
        Ok(Self::from_url(Url::parse(url)?, source))
    }

    /// PUT `source` to an already-parsed URL.
    pub fn from_url(url: Url, source: UploadSource) -> Self {
        Self {
            url,
            source,
            method: UploadMethod::Put,
            authorization: None,
            headers: Vec::new(),
        }
    }

    /// Send as a multipart form field instead of a raw PUT body.
    #[must_use]
    pub fn as_form_field(mut self, field_name: impl Into<String>) -> Self {
        self.method = UploadMethod::Post {
            field_name: field_name.into(),
        };
        self
    }

    /// Send this value as the `Authorization` header.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Add an extra request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Target URL.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// What is being uploaded.
    pub const fn source(&self) -> &UploadSource {
        &self.source
    }

    /// How it is sent.
    pub const fn method(&self) -> &UploadMethod {
        &self.method
    }
}

/// What the server said after accepting an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Final HTTP status.
    pub status: u16,
    /// `ETag` header, as returned by object stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// JSON body, when the server sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

// ============================================================================
// Control
// ============================================================================

/// Per-transfer hooks: progress subscription and cancellation.
///
/// A control is consumed by the transfer it is passed to; create a new one
/// for every call.
#[derive(Debug)]
pub struct TransferControl {
    cancel: CancellationToken,
    cadence: ProgressCadence,
    reporter: Option<ProgressReporter>,
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferControl {
    /// Control with the default progress cadence and no subscriber.
    pub fn new() -> Self {
        Self::with_cadence(ProgressCadence::default())
    }

    /// Control emitting snapshots at `cadence`.
    pub fn with_cadence(cadence: ProgressCadence) -> Self {
        Self {
            cancel: CancellationToken::new(),
            cadence,
            reporter: None,
        }
    }

    /// Subscribe to progress snapshots for the transfer this control is passed to.
    ///
    /// Calling this again replaces the previous subscription, which then ends.
    pub fn report_progress(&mut self) -> ProgressStream {
        let (reporter, stream) = progress::channel(self.cadence);
        self.reporter = Some(reporter);
        stream
    }

    /// Token that cancels the transfer when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation; honoured between chunks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Detached copy of the reporter, for upload bodies.
    pub(crate) fn reporter(&self) -> Option<ProgressReporter> {
        self.reporter.clone()
    }

    pub(crate) fn update(&mut self, bytes: u64, total: Option<u64>) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.update(bytes, total);
        }
    }

    pub(crate) fn finish(&mut self, bytes: u64, total: Option<u64>) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.finish(bytes, total);
        }
    }
}
