//! The transfer engine.
//!
//! Downloads stream into a locked temporary artifact next to the destination
//! and are renamed into place only once complete and verified. Uploads stream
//! from a file or buffer and restart from byte zero on every retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::TemporaryArtifact;
use crate::backend::{
    ByteStream, FetchResponse, OutgoingUpload, ReqwestBackend, TransferBackend, UploadStream,
};
use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult, redact_url};
use crate::request::{DownloadRequest, TransferControl, UploadAck, UploadRequest, UploadSource};
use crate::retry::{AttemptError, Decision, Retrier};

/// Size of chunks read from upload sources.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Longest response body kept in error reports.
const MAX_ERROR_BODY: usize = 2048;

/// Resumable downloads and streamed uploads over a [`TransferBackend`].
#[derive(Debug, Clone)]
pub struct TransferEngine<B = ReqwestBackend> {
    backend: B,
    config: TransferConfig,
}

impl TransferEngine<ReqwestBackend> {
    /// Engine using reqwest.
    pub fn new(config: TransferConfig) -> TransferResult<Self> {
        let backend = ReqwestBackend::new(&config)?;
        Ok(Self { backend, config })
    }
}

impl<B: TransferBackend> TransferEngine<B> {
    /// Engine using a custom backend.
    pub const fn with_backend(backend: B, config: TransferConfig) -> Self {
        Self { backend, config }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Backend in use.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// A fresh control using the configured progress cadence.
    pub fn control(&self) -> TransferControl {
        TransferControl::with_cadence(self.config.progress)
    }

    // ------------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------------

    /// Download without progress or cancellation.
    pub async fn download(&self, request: &DownloadRequest) -> TransferResult<PathBuf> {
        self.download_with(request, self.control()).await
    }

    /// Download, reporting progress to and honouring cancellation from `control`.
    ///
    /// Returns the absolute path of the completed destination.
    pub async fn download_with(
        &self,
        request: &DownloadRequest,
        mut control: TransferControl,
    ) -> TransferResult<PathBuf> {
        let destination = request.destination();
        info!(
            url = %redact_url(request.url()),
            destination = %destination.display(),
            resume = request.resume(),
            "Starting download"
        );

        if let Some(expected) = request.expected_size() {
            if existing_len(destination).await == Some(expected) {
                info!(destination = %destination.display(), "Target file already exists, skipping download");
                control.finish(expected, Some(expected));
                return absolute(destination);
            }
        }

        let artifact = TemporaryArtifact::acquire(destination)?;
        let existing = artifact.len().await?;
        if !request.resume() && existing > 0 {
            debug!(bytes = existing, "Discarding previous partial artifact");
            artifact.truncate().await?;
        } else if let Some(expected) = request.expected_size().filter(|e| existing > *e) {
            warn!(
                bytes = existing,
                expected, "Partial artifact larger than expected size, restarting"
            );
            artifact.truncate().await?;
        }

        let cancel = control.cancel_token();
        let mut retrier = Retrier::new(&self.config.retry);
        let outcome = loop {
            let attempt = retrier.begin();
            debug!(attempt, "Download attempt");
            let err = match self.fetch_once(request, &artifact, &mut control).await {
                Ok(written) => {
                    retrier.succeed();
                    break Ok(written);
                }
                Err(err) => err,
            };
            match retrier.fail(&err) {
                Decision::Retry(delay) => {
                    if let Err(cancelled) = pause(delay, &cancel, &artifact).await {
                        break Err(cancelled);
                    }
                }
                Decision::GiveUp => break Err(retrier.into_error(err, request.url())),
            }
        };

        let written = match outcome {
            Ok(written) => written,
            Err(err @ TransferError::NonRetryableRequest { .. }) => {
                warn!(error = %err, "Request rejected, deleting partial artifact");
                artifact.discard().await?;
                return Err(err);
            }
            Err(err) => {
                if let Ok(len) = artifact.len().await {
                    debug!(bytes = len, artifact = %artifact.path().display(), "Keeping partial artifact");
                }
                return Err(err);
            }
        };

        if let Some(expected) = request.expected_size() {
            if written != expected {
                return Err(TransferError::Integrity {
                    expected,
                    actual: written,
                    artifact: artifact.path().to_path_buf(),
                });
            }
        }

        let path = artifact.promote().await?;
        control.finish(written, Some(written));
        info!(destination = %path.display(), bytes = written, "Download complete");
        absolute(&path)
    }

    /// One GET, written into the artifact. Returns bytes on disk afterwards.
    async fn fetch_once(
        &self,
        request: &DownloadRequest,
        artifact: &TemporaryArtifact,
        control: &mut TransferControl,
    ) -> Result<u64, AttemptError> {
        let mut offset = artifact.len().await?;
        if control.is_cancelled() {
            return Err(TransferError::Cancelled {
                bytes_transferred: offset,
            }
            .into());
        }

        let auth = request.authorization.as_deref();
        let range = (offset > 0).then_some(offset);
        if let Some(offset) = range {
            debug!(offset, "Requesting remaining bytes");
        }
        let mut response = self.backend.fetch(request.url(), range, auth).await?;

        if response.status == 416 && offset > 0 {
            let complete = response
                .content_range
                .and_then(|r| r.complete_length)
                .or(request.expected_size());
            if complete == Some(offset) {
                info!(bytes = offset, "Partial artifact is already complete");
                return Ok(offset);
            }
            warn!(offset, "Server rejected resume offset, restarting from zero");
            artifact.truncate().await?;
            offset = 0;
            response = self.backend.fetch(request.url(), None, auth).await?;
        }

        if response.status == 206 && offset > 0 {
            let answered = response.content_range.map(|r| r.start);
            if let Some(start) = answered.filter(|&start| start != offset && start != 0) {
                warn!(offset, start, "Server answered from another offset, restarting from zero");
                artifact.truncate().await?;
                offset = 0;
                response = self.backend.fetch(request.url(), None, auth).await?;
            }
        }

        if !(200..300).contains(&response.status) {
            let status = response.status;
            let body = clip(response.text(MAX_ERROR_BODY).await);
            return Err(AttemptError::Status { status, body });
        }

        let start = match (response.status, response.content_range) {
            (206, Some(range)) if range.start == offset => offset,
            (206, Some(range)) if range.start == 0 => {
                info!(offset, "Server sent the whole resource, restarting from zero");
                0
            }
            (206, Some(range)) => {
                artifact.truncate().await?;
                return Err(AttemptError::Connection(format!(
                    "server answered from byte {} instead of {offset}",
                    range.start
                )));
            }
            (206, None) => offset,
            _ => {
                if offset > 0 {
                    info!(offset, "Server ignored range request, restarting from zero");
                }
                0
            }
        };

        let server_total = match response.content_range.and_then(|r| r.complete_length) {
            Some(total) => Some(total),
            None => response.content_length.map(|len| start + len),
        };
        let total = request.expected_size().or(server_total);
        let advertised = response.content_length;

        let mut file = artifact.open_at(start).await?;
        control.update(start, total);
        let streamed = self
            .stream_into(&mut file, artifact.path(), response, start, total, control)
            .await;
        let flushed = finish_file(&mut file, artifact.path()).await;
        let written = streamed?;
        flushed?;

        if let Some(len) = advertised {
            let received = written - start;
            if received < len {
                return Err(AttemptError::Connection(format!(
                    "body ended after {received} of {len} bytes"
                )));
            }
        }
        Ok(written)
    }

    /// Copy body chunks into `file`, strictly in order.
    async fn stream_into(
        &self,
        file: &mut tokio::fs::File,
        path: &Path,
        response: FetchResponse,
        start: u64,
        total: Option<u64>,
        control: &mut TransferControl,
    ) -> Result<u64, AttemptError> {
        let cancel = control.cancel_token();
        let idle = self.config.idle_timeout;
        let mut body: ByteStream = response.body;
        let mut written = start;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled {
                    bytes_transferred: written,
                }
                .into());
            }
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(TransferError::Cancelled { bytes_transferred: written }.into());
                }
                next = tokio::time::timeout(idle, body.next()) => next,
            };
            let chunk = match next {
                Err(_) => {
                    return Err(AttemptError::Connection(format!(
                        "no data received for {}s",
                        idle.as_secs()
                    )));
                }
                Ok(None) => return Ok(written),
                Ok(Some(Err(e))) => return Err(AttemptError::Connection(e.to_string())),
                Ok(Some(Ok(chunk))) => chunk,
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::filesystem("write", path, e))?;
            written += chunk.len() as u64;
            control.update(written, total);
        }
    }

    // ------------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------------

    /// Upload without progress or cancellation.
    pub async fn upload(&self, request: &UploadRequest) -> TransferResult<UploadAck> {
        self.upload_with(request, self.control()).await
    }

    /// Upload, reporting progress to and honouring cancellation from `control`.
    pub async fn upload_with(
        &self,
        request: &UploadRequest,
        mut control: TransferControl,
    ) -> TransferResult<UploadAck> {
        let length = request.source().len().await?;
        let file_name = request.source().file_name();
        info!(
            url = %redact_url(request.url()),
            file = %file_name,
            bytes = length,
            "Starting upload"
        );

        let ack = {
            let control = &control;
            let file_name = file_name.as_str();
            self.config
                .retry
                .run(request.url(), move |attempt| async move {
                    debug!(attempt, "Sending upload body");
                    self.send_once(request, control, length, file_name).await
                })
                .await?
        };

        control.finish(length, Some(length));
        info!(status = ack.status, bytes = length, "Upload complete");
        Ok(ack)
    }

    async fn send_once(
        &self,
        request: &UploadRequest,
        control: &TransferControl,
        length: u64,
        file_name: &str,
    ) -> Result<UploadAck, AttemptError> {
        if control.is_cancelled() {
            return Err(TransferError::Cancelled {
                bytes_transferred: 0,
            }
            .into());
        }

        let sent = Arc::new(AtomicU64::new(0));
        let base = open_source(request.source()).await?;
        let body = counted(base, length, control, Arc::clone(&sent));

        let response = self
            .backend
            .send(OutgoingUpload {
                url: request.url(),
                method: request.method(),
                authorization: request.authorization.as_deref(),
                headers: &request.headers,
                file_name: file_name.to_string(),
                length,
                body,
            })
            .await;

        let response = match response {
            Err(_) if control.is_cancelled() => {
                return Err(TransferError::Cancelled {
                    bytes_transferred: sent.load(Ordering::Relaxed),
                }
                .into());
            }
            other => other?,
        };

        if !(200..300).contains(&response.status) {
            return Err(AttemptError::Status {
                status: response.status,
                body: clip(String::from_utf8_lossy(&response.body).into_owned()),
            });
        }

        let is_json = response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"));
        let payload = if is_json && !response.body.is_empty() {
            let value = serde_json::from_slice(&response.body).map_err(|e| {
                TransferError::InvalidResponse {
                    message: format!("upload response is not valid JSON: {e}"),
                }
            })?;
            Some(value)
        } else {
            None
        };

        Ok(UploadAck {
            status: response.status,
            etag: response.etag,
            payload,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn existing_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len())
}

fn absolute(path: &Path) -> TransferResult<PathBuf> {
    std::path::absolute(path).map_err(|e| TransferError::filesystem("resolve", path, e))
}

/// Wait out a retry delay unless cancelled first.
async fn pause(
    delay: std::time::Duration,
    cancel: &CancellationToken,
    artifact: &TemporaryArtifact,
) -> TransferResult<()> {
    if delay.is_zero() && !cancel.is_cancelled() {
        return Ok(());
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransferError::Cancelled {
            bytes_transferred: artifact.len().await?,
        }),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

async fn finish_file(file: &mut tokio::fs::File, path: &Path) -> Result<(), AttemptError> {
    file.flush()
        .await
        .map_err(|e| TransferError::filesystem("flush", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| TransferError::filesystem("sync", path, e))?;
    Ok(())
}

fn clip(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

async fn open_source(source: &UploadSource) -> Result<UploadStream, AttemptError> {
    match source {
        UploadSource::File(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| TransferError::filesystem("open", path, e))?;
            Ok(Box::pin(ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE)))
        }
        UploadSource::Buffer { bytes, .. } => {
            let chunks: Vec<std::io::Result<Bytes>> = (0..bytes.len())
                .step_by(UPLOAD_CHUNK_SIZE)
                .map(|start| Ok(bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len()))))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }
}

/// Count sent bytes, report progress and stop between chunks on cancel.
fn counted(
    base: UploadStream,
    length: u64,
    control: &TransferControl,
    sent: Arc<AtomicU64>,
) -> UploadStream {
    let cancel = control.cancel_token();
    let mut reporter = control.reporter();
    Box::pin(base.map(move |chunk| {
        if cancel.is_cancelled() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "upload cancelled",
            ));
        }
        if let Ok(bytes) = &chunk {
            let now = sent.fetch_add(bytes.len() as u64, Ordering::Relaxed) + bytes.len() as u64;
            if let Some(reporter) = reporter.as_mut() {
                reporter.update(now, Some(length));
            }
        }
        chunk
    }))
}
