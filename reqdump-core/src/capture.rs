//! Request body capture and replay.
//!
//! An HTTP request body is a forward-only stream: once the dump path has read
//! it, the downstream handler would see nothing. [`capture_body`] drains the
//! stream exactly once into memory, and [`CapturedBody::replay`] hands out as
//! many fresh [`ReplayBody`] streams over the same bytes as callers need.
//!
//! # Memory bound
//!
//! Accumulation stops at a caller-supplied ceiling. A body that crosses it is
//! not lost: the failure carries the bytes read so far and the untouched rest
//! of the stream, so the request can still be forwarded byte for byte.
//!
//! # Absent bodies
//!
//! A body that reports `is_end_stream()` up front (e.g. `GET` with no payload)
//! is never polled and yields an empty capture.

use bytes::{Bytes, BytesMut};
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::borrow::Cow;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::error::{BoxError, CaptureError};

/// Size of the data frames emitted by [`ReplayBody`].
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default capture ceiling (2 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Captured body
// ─────────────────────────────────────────────────────────────────────────────

/// A fully buffered request body, plus trailers if the client sent any.
///
/// Cloning is cheap: the payload is a reference-counted [`Bytes`].
#[derive(Debug, Clone, Default)]
pub struct CapturedBody {
    data: Bytes,
    trailers: Option<HeaderMap>,
}

impl CapturedBody {
    /// An empty capture (no body on the wire).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a capture from bytes that are already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            trailers: None,
        }
    }

    /// The captured bytes, exactly as read from the transport.
    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    /// The payload as text for display. Invalid UTF-8 sequences are replaced;
    /// [`payload`](Self::payload) is never affected.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Trailers received after the last data frame.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A fresh stream over the captured bytes, starting at offset 0.
    pub fn replay(&self) -> ReplayBody {
        self.replay_with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Same as [`replay`](Self::replay) with a custom frame size.
    pub fn replay_with_chunk_size(&self, chunk_size: usize) -> ReplayBody {
        ReplayBody::new(self.data.clone(), self.trailers.clone(), chunk_size)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Draining
// ─────────────────────────────────────────────────────────────────────────────

/// Bytes already pulled off a body that crossed the ceiling, together with
/// the part of the stream that was never read.
pub struct Unread<B> {
    pub prefix: Bytes,
    pub rest: B,
}

/// Why a body could not be captured, and what is left of it.
pub struct CaptureFailure<B> {
    pub error: CaptureError,
    /// `Some` for [`CaptureError::TooLarge`]; a failed stream cannot be resumed.
    pub unread: Option<Unread<B>>,
}

impl<B> std::fmt::Debug for CaptureFailure<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureFailure")
            .field("error", &self.error)
            .field(
                "unread_prefix_len",
                &self.unread.as_ref().map(|u| u.prefix.len()),
            )
            .finish()
    }
}

/// Drain `body` into memory, reading at most `limit` bytes.
///
/// Data frames are appended as they arrive; trailer frames are kept aside
/// and replayed after the data. The original stream is dropped on success.
///
/// # Errors
///
/// - [`CaptureError::TooLarge`] when the declared or observed size exceeds
///   `limit`. The failure's `unread` holds the bytes read so far and the
///   remaining stream.
/// - [`CaptureError::Read`] when the stream yields an error.
pub async fn capture_body<B>(mut body: B, limit: usize) -> Result<CapturedBody, CaptureFailure<B>>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    if body.is_end_stream() {
        return Ok(CapturedBody::empty());
    }

    // Content-Length already tells us this will not fit: leave the stream alone.
    let hint = body.size_hint();
    if hint.lower() > limit as u64 {
        debug!(declared = hint.lower(), limit, "Declared body size exceeds capture limit");
        return Err(CaptureFailure {
            error: CaptureError::TooLarge { limit },
            unread: Some(Unread {
                prefix: Bytes::new(),
                rest: body,
            }),
        });
    }

    let initial = hint
        .exact()
        .map(|n| (n as usize).min(limit))
        .unwrap_or(DEFAULT_CHUNK_SIZE);
    let mut buf = BytesMut::with_capacity(initial);
    let mut trailers: Option<HeaderMap> = None;

    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let source: BoxError = e.into();
                warn!(bytes_read = buf.len(), error = %source, "Request body stream failed");
                return Err(CaptureFailure {
                    error: CaptureError::Read {
                        bytes_read: buf.len(),
                        source,
                    },
                    unread: None,
                });
            }
        };

        match frame.into_data() {
            Ok(data) => {
                let over = buf.len() + data.len() > limit;
                buf.extend_from_slice(&data);
                if over {
                    return Err(CaptureFailure {
                        error: CaptureError::TooLarge { limit },
                        unread: Some(Unread {
                            prefix: buf.freeze(),
                            rest: body,
                        }),
                    });
                }
            }
            Err(frame) => {
                if let Ok(t) = frame.into_trailers() {
                    match trailers.as_mut() {
                        Some(existing) => existing.extend(t),
                        None => trailers = Some(t),
                    }
                }
            }
        }
    }

    Ok(CapturedBody {
        data: buf.freeze(),
        trailers,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay stream
// ─────────────────────────────────────────────────────────────────────────────

/// An `http_body::Body` over captured bytes.
///
/// Emits the payload in frames of at most `chunk_size` bytes, then the
/// trailers. Each instance is read once; ask the [`CapturedBody`] for a new
/// one to read again.
#[derive(Debug, Clone)]
pub struct ReplayBody {
    data: Bytes,
    trailers: Option<HeaderMap>,
    chunk_size: usize,
}

impl ReplayBody {
    pub fn new(data: Bytes, trailers: Option<HeaderMap>, chunk_size: usize) -> Self {
        Self {
            data,
            trailers,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Body for ReplayBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if !self.data.is_empty() {
            let n = self.chunk_size.min(self.data.len());
            let chunk = self.data.split_to(n);
            return Poll::Ready(Some(Ok(Frame::data(chunk))));
        }
        Poll::Ready(self.trailers.take().map(|t| Ok(Frame::trailers(t))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_empty() && self.trailers.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.len() as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Captured request
// ─────────────────────────────────────────────────────────────────────────────

/// A request whose body has been captured.
///
/// Holds the original request head and replaces only the body: method, URI,
/// version, headers and extensions are passed through untouched.
#[derive(Debug)]
pub struct CapturedRequest {
    head: Parts,
    body: CapturedBody,
}

impl CapturedRequest {
    pub fn from_parts(head: Parts, body: CapturedBody) -> Self {
        Self { head, body }
    }

    /// Capture the body of `req`, discarding whatever is left on failure.
    ///
    /// Use [`capture_body`] directly when an over-limit body must still be
    /// forwarded.
    pub async fn capture<B>(req: Request<B>, limit: usize) -> Result<Self, CaptureError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        let (head, body) = req.into_parts();
        match capture_body(body, limit).await {
            Ok(body) => Ok(Self { head, body }),
            Err(failure) => Err(failure.error),
        }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// The URI path, without the query string.
    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.head.uri.query()
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn head(&self) -> &Parts {
        &self.head
    }

    pub fn captured(&self) -> &CapturedBody {
        &self.body
    }

    pub fn payload(&self) -> &Bytes {
        self.body.payload()
    }

    pub fn payload_str(&self) -> Cow<'_, str> {
        self.body.payload_str()
    }

    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.body.trailers()
    }

    /// A fresh body stream for downstream consumption.
    pub fn body(&self) -> ReplayBody {
        self.body.replay()
    }

    /// Rebuild an `http::Request` carrying a replay of the captured body.
    pub fn into_request(self) -> Request<ReplayBody> {
        self.into_request_with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn into_request_with_chunk_size(self, chunk_size: usize) -> Request<ReplayBody> {
        let body = self.body.replay_with_chunk_size(chunk_size);
        Request::from_parts(self.head, body)
    }
}
