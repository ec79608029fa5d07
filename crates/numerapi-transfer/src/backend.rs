//! HTTP backend abstraction for transfers.
//!
//! The engine talks to the network only through [`TransferBackend`], which
//! keeps status classification and file handling in the engine and lets tests
//! substitute a scripted backend. The production implementation uses reqwest.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, HeaderMap, RANGE,
};
use url::Url;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::request::UploadMethod;
use crate::retry::AttemptError;

/// Chunks of a received body, in order.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Chunks of a body to send; reqwest requires these to be `Sync`.
pub type UploadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

// ============================================================================
// Wire types
// ============================================================================

/// Byte range announced by a `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte offset in this response.
    pub start: u64,
    /// Full size of the resource, when the server knows it.
    pub complete_length: Option<u64>,
}

impl ContentRange {
    /// Parse `bytes <start>-<end>/<total>` (total may be `*`).
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = spec.split_once('/')?;
        let complete_length = match total.trim() {
            "*" => None,
            n => Some(n.parse().ok()?),
        };
        let start = match range.split_once('-') {
            Some((start, _end)) => start.trim().parse().ok()?,
            // `bytes */<total>` as sent with 416
            None if range.trim() == "*" => 0,
            None => return None,
        };
        Some(Self {
            start,
            complete_length,
        })
    }
}

/// Response to a GET.
pub struct FetchResponse {
    /// HTTP status.
    pub status: u16,
    /// `Content-Length` of this response body.
    pub content_length: Option<u64>,
    /// Parsed `Content-Range`, if present.
    pub content_range: Option<ContentRange>,
    /// Body chunks.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Read at most about `limit` bytes of the body into a string, for error reports.
    ///
    /// Stops at the first chunk that reaches the limit; the rest is never read.
    pub async fn text(mut self, limit: usize) -> String {
        let mut bytes = Vec::new();
        while bytes.len() <= limit {
            match self.body.next().await {
                Some(Ok(chunk)) => bytes.extend_from_slice(&chunk),
                Some(Err(_)) | None => break,
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// A body ready to send.
pub struct OutgoingUpload<'a> {
    /// Target URL.
    pub url: &'a Url,
    /// PUT or multipart POST.
    pub method: &'a UploadMethod,
    /// `Authorization` header value.
    pub authorization: Option<&'a str>,
    /// Extra headers.
    pub headers: &'a [(String, String)],
    /// File name for multipart forms.
    pub file_name: String,
    /// Exact body length.
    pub length: u64,
    /// Body chunks.
    pub body: UploadStream,
}

/// Response to an upload.
#[derive(Debug, Clone)]
pub struct SendResponse {
    /// HTTP status.
    pub status: u16,
    /// `ETag` header.
    pub etag: Option<String>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// Full body.
    pub body: Bytes,
}

// ============================================================================
// Backend trait
// ============================================================================

/// Moves bytes over HTTP without interpreting statuses.
///
/// Implementations return `Err` only when no response was obtained; any
/// status, including errors, comes back as `Ok`.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// GET `url`, optionally from byte `range_start` onwards.
    async fn fetch(
        &self,
        url: &Url,
        range_start: Option<u64>,
        authorization: Option<&str>,
    ) -> Result<FetchResponse, AttemptError>;

    /// Send an upload body.
    async fn send(&self, upload: OutgoingUpload<'_>) -> Result<SendResponse, AttemptError>;
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production HTTP backend using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Create a new reqwest backend with the given configuration.
    pub fn new(config: &TransferConfig) -> TransferResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(TransferError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn connection_error(err: &reqwest::Error) -> AttemptError {
    AttemptError::Connection(without_url(err))
}

/// reqwest includes the full URL in its messages; pre-signed URLs must not leak.
fn without_url(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    if let Some(url) = err.url() {
        message = message.replace(url.as_str(), &crate::error::redact_url(url));
    }
    message
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

#[async_trait]
impl TransferBackend for ReqwestBackend {
    async fn fetch(
        &self,
        url: &Url,
        range_start: Option<u64>,
        authorization: Option<&str>,
    ) -> Result<FetchResponse, AttemptError> {
        let mut request = self.client.get(url.clone());
        if let Some(offset) = range_start {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        if let Some(auth) = authorization {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|e| connection_error(&e))?;
        let content_range =
            header_str(response.headers(), CONTENT_RANGE).and_then(|v| ContentRange::parse(&v));

        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            content_range,
            body: response
                .bytes_stream()
                .map_err(|e| std::io::Error::other(without_url(&e)))
                .boxed(),
        })
    }

    async fn send(&self, upload: OutgoingUpload<'_>) -> Result<SendResponse, AttemptError> {
        let mut request = match upload.method {
            UploadMethod::Put => self
                .client
                .put(upload.url.clone())
                .header(CONTENT_LENGTH, upload.length)
                .body(reqwest::Body::wrap_stream(upload.body)),
            UploadMethod::Post { field_name } => {
                let part = reqwest::multipart::Part::stream_with_length(
                    reqwest::Body::wrap_stream(upload.body),
                    upload.length,
                )
                .file_name(upload.file_name);
                let form = reqwest::multipart::Form::new().part(field_name.clone(), part);
                self.client.post(upload.url.clone()).multipart(form)
            }
        };
        if let Some(auth) = upload.authorization {
            request = request.header(AUTHORIZATION, auth);
        }
        for (name, value) in upload.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| connection_error(&e))?;
        let status = response.status().as_u16();
        let etag = header_str(response.headers(), ETAG);
        let content_type = header_str(response.headers(), CONTENT_TYPE);
        let body = response.bytes().await.map_err(|e| connection_error(&e))?;

        Ok(SendResponse {
            status,
            etag,
            content_type,
            body,
        })
    }
}
