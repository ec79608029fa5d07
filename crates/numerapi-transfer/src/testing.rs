//! Scripted in-memory backend for tests.
//!
//! [`FakeBackend`] serves one resource with range support and accepts
//! uploads. Faults queued with [`FakeBackend::with_fault`] are consumed one per
//! request, in order; once the queue is empty requests succeed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::{ContentRange, FetchResponse, OutgoingUpload, SendResponse, TransferBackend};
use crate::request::UploadMethod;
use crate::retry::AttemptError;

/// What to do to one request.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail before any response (connection refused/reset).
    ConnectionReset,
    /// Answer with this status and body.
    Status(u16, &'static str),
    /// Send this many body bytes, then reset the connection.
    ResetAfter(usize),
    /// Answer 200 with the whole resource even if a range was asked for.
    IgnoreRange,
    /// Advertise the full length but only send this many bytes.
    Truncate(usize),
    /// Answer a range request with 206 from this byte, whatever was asked.
    RangeFrom(u64),
}

/// One request as the fake saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// "GET", "PUT" or "POST".
    pub method: &'static str,
    /// Requested URL.
    pub url: String,
    /// Offset from the `Range` header.
    pub range_start: Option<u64>,
    /// `Authorization` header.
    pub authorization: Option<String>,
    /// Extra upload headers.
    pub headers: Vec<(String, String)>,
    /// Declared upload length.
    pub declared_length: Option<u64>,
    /// Upload bytes actually read from the body.
    pub received: Vec<u8>,
    /// Multipart field name, for form uploads.
    pub field_name: Option<String>,
}

/// Canned reply to a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReply {
    /// Status to answer with.
    pub status: u16,
    /// `Content-Type` to answer with.
    pub content_type: Option<&'static str>,
    /// Body to answer with.
    pub body: &'static str,
    /// `ETag` to answer with.
    pub etag: Option<&'static str>,
}

impl Default for UploadReply {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: None,
            body: "",
            etag: Some("\"d41d8cd98f00b204e9800998ecf8427e\""),
        }
    }
}

/// A fake HTTP backend serving a single resource.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    content: Bytes,
    chunk_size: usize,
    faults: Arc<Mutex<VecDeque<Fault>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    upload_reply: UploadReply,
    cancel_after: Option<(u64, CancellationToken)>,
}

impl FakeBackend {
    /// Serve `content` in 1 KiB chunks.
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            chunk_size: 1024,
            faults: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            upload_reply: UploadReply::default(),
            cancel_after: None,
        }
    }

    /// Change the body chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Queue a fault for the next unfaulted request.
    #[must_use]
    pub fn with_fault(self, fault: Fault) -> Self {
        self.faults.lock().unwrap().push_back(fault);
        self
    }

    /// Reply to uploads with this.
    #[must_use]
    pub fn with_upload_reply(mut self, reply: UploadReply) -> Self {
        self.upload_reply = reply;
        self
    }

    /// Trigger `token` once a download body has passed `offset` bytes, or
    /// once this many upload bytes have been read.
    #[must_use]
    pub fn cancel_at(mut self, offset: u64, token: CancellationToken) -> Self {
        self.cancel_after = Some((offset, token));
        self
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_fault(&self) -> Option<Fault> {
        self.faults.lock().unwrap().pop_front()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().unwrap().push(request);
    }

    fn chunked(&self, bytes: Bytes, base_offset: u64, fail_at_end: bool) -> crate::backend::ByteStream {
        let mut chunks: Vec<std::io::Result<Bytes>> = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let end = (pos + self.chunk_size).min(bytes.len());
            chunks.push(Ok(bytes.slice(pos..end)));
            pos = end;
        }
        if fail_at_end {
            chunks.push(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }

        let cancel_after = self.cancel_after.clone();
        let mut sent = base_offset;
        futures_util::stream::iter(chunks)
            .map(move |chunk| {
                if let (Ok(bytes), Some((limit, token))) = (&chunk, &cancel_after) {
                    sent += bytes.len() as u64;
                    if sent >= *limit {
                        token.cancel();
                    }
                }
                chunk
            })
            .boxed()
    }
}

#[async_trait]
impl TransferBackend for FakeBackend {
    async fn fetch(
        &self,
        url: &Url,
        range_start: Option<u64>,
        authorization: Option<&str>,
    ) -> Result<FetchResponse, AttemptError> {
        self.record(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            range_start,
            authorization: authorization.map(ToString::to_string),
            headers: Vec::new(),
            declared_length: None,
            received: Vec::new(),
            field_name: None,
        });

        let total = self.content.len() as u64;
        let fault = self.next_fault();
        let honour_range = !matches!(fault, Some(Fault::IgnoreRange));
        let forced_start = match fault {
            Some(Fault::RangeFrom(start)) => Some(start.min(total)),
            _ => None,
        };

        match fault {
            Some(Fault::ConnectionReset) => {
                return Err(AttemptError::Connection("connection reset by peer".to_string()));
            }
            Some(Fault::Status(status, body)) => {
                return Ok(FetchResponse {
                    status,
                    content_length: Some(body.len() as u64),
                    content_range: None,
                    body: self.chunked(Bytes::from_static(body.as_bytes()), 0, false),
                });
            }
            _ => {}
        }

        let start = match (range_start, forced_start) {
            (Some(_), Some(forced)) => forced,
            (Some(offset), None) if honour_range => {
                if offset >= total {
                    return Ok(FetchResponse {
                        status: 416,
                        content_length: Some(0),
                        content_range: Some(ContentRange {
                            start: 0,
                            complete_length: Some(total),
                        }),
                        body: self.chunked(Bytes::new(), 0, false),
                    });
                }
                offset
            }
            _ => 0,
        };

        #[allow(clippy::cast_possible_truncation)]
        let remaining = self.content.slice(start as usize..);
        let advertised = remaining.len() as u64;
        let (body, fail) = match fault {
            Some(Fault::ResetAfter(n)) => (remaining.slice(..n.min(remaining.len())), true),
            Some(Fault::Truncate(n)) => (remaining.slice(..n.min(remaining.len())), false),
            _ => (remaining, false),
        };
        let partial = range_start.is_some() && honour_range;

        Ok(FetchResponse {
            status: if partial { 206 } else { 200 },
            content_length: Some(advertised),
            content_range: partial.then_some(ContentRange {
                start,
                complete_length: Some(total),
            }),
            body: self.chunked(body, start, fail),
        })
    }

    async fn send(&self, upload: OutgoingUpload<'_>) -> Result<SendResponse, AttemptError> {
        let (method, field_name) = match upload.method {
            UploadMethod::Put => ("PUT", None),
            UploadMethod::Post { field_name } => ("POST", Some(field_name.clone())),
        };
        let fault = self.next_fault();

        let mut received = Vec::new();
        let mut body = upload.body;
        let mut read_error = None;
        if !matches!(fault, Some(Fault::ConnectionReset)) {
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        received.extend_from_slice(&bytes);
                        if let Some((limit, token)) = &self.cancel_after {
                            if received.len() as u64 >= *limit {
                                token.cancel();
                            }
                        }
                    }
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
        }

        self.record(RecordedRequest {
            method,
            url: upload.url.to_string(),
            range_start: None,
            authorization: upload.authorization.map(ToString::to_string),
            headers: upload.headers.to_vec(),
            declared_length: Some(upload.length),
            received,
            field_name,
        });

        if let Some(e) = read_error {
            return Err(AttemptError::Connection(e.to_string()));
        }

        match fault {
            Some(Fault::ConnectionReset | Fault::ResetAfter(_) | Fault::Truncate(_)) => {
                Err(AttemptError::Connection("connection reset by peer".to_string()))
            }
            Some(Fault::Status(status, body)) => Ok(SendResponse {
                status,
                etag: None,
                content_type: Some("text/plain".to_string()),
                body: Bytes::from_static(body.as_bytes()),
            }),
            Some(Fault::IgnoreRange | Fault::RangeFrom(_)) | None => Ok(SendResponse {
                status: self.upload_reply.status,
                etag: self.upload_reply.etag.map(ToString::to_string),
                content_type: self.upload_reply.content_type.map(ToString::to_string),
                body: Bytes::from_static(self.upload_reply.body.as_bytes()),
            }),
        }
    }
}
