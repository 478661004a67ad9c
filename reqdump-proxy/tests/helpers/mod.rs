//! Shared fixtures for reqdump-proxy integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{HeaderMap, Method, Request, Response};
use http_body::{Body, Frame};
use http_body_util::{BodyExt, Full, StreamBody};
use reqdump_core::DumpSink;
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What the downstream service saw for one request.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// `Err` holds the body error message.
    pub body: Result<Bytes, String>,
}

/// Downstream service that reads the whole body and remembers it.
#[derive(Clone, Default)]
pub struct RecordingService {
    received: Arc<Mutex<Vec<Received>>>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// The only request seen so far.
    pub fn single(&self) -> Received {
        let received = self.received();
        assert_eq!(received.len(), 1, "expected exactly one forwarded request");
        received.into_iter().next().unwrap()
    }
}

impl<B> Service<Request<B>> for RecordingService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let received = self.received.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(e) => {
                    let e: BoxError = e.into();
                    Err(e.to_string())
                }
            };
            received.lock().unwrap().push(Received {
                method: parts.method,
                path: parts.uri.path().to_string(),
                query: parts.uri.query().map(str::to_string),
                headers: parts.headers,
                body,
            });
            Ok(Response::new(Full::new(Bytes::from_static(b"ok"))))
        })
    }
}

/// Sink that rejects every record.
#[derive(Debug, Default)]
pub struct FailingSink;

impl DumpSink for FailingSink {
    fn write_dump(&self, _record: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Yields `prefix` as one data frame, then fails.
pub struct FailingBody {
    prefix: Option<Bytes>,
}

impl FailingBody {
    pub fn after(prefix: &'static [u8]) -> Self {
        Self {
            prefix: Some(Bytes::from_static(prefix)),
        }
    }
}

impl Body for FailingBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.prefix.take() {
            Some(prefix) => Poll::Ready(Some(Ok(Frame::data(prefix)))),
            None => Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )))),
        }
    }
}

pub type ChunkStream =
    StreamBody<futures_util::stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, Infallible>>>>;

/// Streaming body with no declared length, one frame per chunk.
pub fn chunked(chunks: &[&'static str]) -> ChunkStream {
    let frames: Vec<Result<Frame<Bytes>, Infallible>> = chunks
        .iter()
        .map(|c| Ok(Frame::data(Bytes::from_static(c.as_bytes()))))
        .collect();
    StreamBody::new(futures_util::stream::iter(frames))
}

pub fn full(body: impl Into<Bytes>) -> Full<Bytes> {
    Full::new(body.into())
}
