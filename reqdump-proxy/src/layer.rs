//! Tower middleware that dumps each request before passing it on.
//!
//! For every request the service:
//!
//! 1. lets CONNECT requests through untouched,
//! 2. drains the body once (bounded by `max_body_bytes`),
//! 3. renders and writes a dump record when the method filter matches,
//! 4. forwards the request with a body that replays the captured bytes.
//!
//! A body over the limit is not buffered: the record carries a note in place
//! of the payload and the body is forwarded as read bytes plus the unread
//! stream. `Upgrade` requests are ordinary requests here; the pending upgrade
//! rides along in the request extensions.
//!
//! Nothing on the dump path can fail the request. Capture, render and sink
//! errors are logged and the request is forwarded regardless.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::request::Parts;
use http::{HeaderValue, Method, Request};
use http_body::Body;
use reqdump_core::capture::{CaptureFailure, Unread, capture_body};
use reqdump_core::dump::{render_oversized, render_request};
use reqdump_core::{CaptureError, CapturedRequest, DumpConfig, DumpError, DumpResult, DumpSink, StdoutSink};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, error, info, warn};

use crate::error::BoxError;
use crate::forward_body::ForwardBody;

/// What the dump step did with one request.
#[derive(Debug)]
pub enum DumpOutcome {
    /// A record was written to the sink.
    Dumped,
    /// The body exceeded `limit`; a record without the payload was written.
    DumpedWithoutBody { limit: usize },
    /// The method filter excluded it.
    Filtered,
    /// CONNECT request; body left alone.
    Bypassed,
    /// Capture, render or sink failed. The request was still forwarded.
    Failed(DumpError),
}

impl DumpOutcome {
    pub fn is_dumped(&self) -> bool {
        matches!(self, DumpOutcome::Dumped | DumpOutcome::DumpedWithoutBody { .. })
    }
}

/// Configuration and sink shared by every clone of the service.
///
/// Lives as long as the last service clone; dropping it marks the end of the
/// dumper's lifetime in the operational log.
struct DumpState {
    config: DumpConfig,
    sink: Arc<dyn DumpSink>,
}

impl Drop for DumpState {
    fn drop(&mut self) {
        info!("Request dumper destroyed");
    }
}

/// Layer producing [`RequestDumpService`].
#[derive(Clone)]
pub struct RequestDumpLayer {
    state: Arc<DumpState>,
}

impl RequestDumpLayer {
    /// Dump to standard output.
    pub fn new(config: DumpConfig) -> Self {
        Self::with_sink(config, Arc::new(StdoutSink))
    }

    pub fn with_sink(config: DumpConfig, sink: Arc<dyn DumpSink>) -> Self {
        info!(
            dump_headers = config.include_headers,
            dump_payload = config.include_body,
            methods = %config.method_filter,
            max_body_bytes = config.max_body_bytes,
            sink = sink.name(),
            "Request dumper initialized"
        );
        Self {
            state: Arc::new(DumpState { config, sink }),
        }
    }

    pub fn config(&self) -> &DumpConfig {
        &self.state.config
    }

    /// Run the dump step on one request without a downstream service.
    pub async fn intercept<B>(&self, req: Request<B>) -> (Request<ForwardBody<B>>, DumpOutcome)
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        self.state.intercept(req).await
    }
}

impl<S> Layer<S> for RequestDumpLayer {
    type Service = RequestDumpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestDumpService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Service that dumps a request, then calls `S` with [`ForwardBody`].
#[derive(Clone)]
pub struct RequestDumpService<S> {
    inner: S,
    state: Arc<DumpState>,
}

impl<S, B> Service<Request<B>> for RequestDumpService<S>
where
    S: Service<Request<ForwardBody<B>>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Body<Data = Bytes> + Unpin + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the clone that was driven to readiness; leave a fresh one behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();

        Box::pin(async move {
            let (req, _outcome) = state.intercept(req).await;
            inner.call(req).await
        })
    }
}

impl DumpState {
    async fn intercept<B>(&self, req: Request<B>) -> (Request<ForwardBody<B>>, DumpOutcome)
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        if is_tunnel(&req) {
            debug!(method = %req.method(), "Skipping dump for tunnel request");
            return (req.map(ForwardBody::Passthrough), DumpOutcome::Bypassed);
        }

        let (mut parts, body) = req.into_parts();

        match capture_body(body, self.config.max_body_bytes).await {
            Ok(body) => {
                let captured = CapturedRequest::from_parts(parts, body);
                let outcome = match self.dump(captured.method(), || render_request(&captured, &self.config)) {
                    Ok(true) => DumpOutcome::Dumped,
                    Ok(false) => DumpOutcome::Filtered,
                    Err(e) => {
                        report_failure(captured.method(), captured.path(), &e);
                        DumpOutcome::Failed(e)
                    }
                };
                let forwarded = captured
                    .into_request_with_chunk_size(self.config.replay_chunk_size)
                    .map(ForwardBody::Replay);
                (forwarded, outcome)
            }
            Err(CaptureFailure {
                error: CaptureError::TooLarge { limit },
                unread: Some(Unread { prefix, rest }),
            }) => {
                warn!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    limit,
                    "Request body exceeds capture limit, dumping without payload"
                );
                let outcome = match self.dump(&parts.method, || render_oversized(&parts, limit, &self.config)) {
                    Ok(true) => DumpOutcome::DumpedWithoutBody { limit },
                    Ok(false) => DumpOutcome::Filtered,
                    Err(e) => {
                        report_failure(&parts.method, parts.uri.path(), &e);
                        DumpOutcome::Failed(e)
                    }
                };
                let body = ForwardBody::spliced(prefix, rest);
                (Request::from_parts(parts, body), outcome)
            }
            Err(CaptureFailure { error, .. }) => {
                // The stream is gone; nothing is left to forward.
                reset_framing(&mut parts);
                let err = DumpError::from(error);
                report_failure(&parts.method, parts.uri.path(), &err);
                (Request::from_parts(parts, ForwardBody::Empty), DumpOutcome::Failed(err))
            }
        }
    }

    /// Render and write a record for `method`. Returns `Ok(false)` when the
    /// method filter skips the request.
    fn dump<F>(&self, method: &Method, render: F) -> DumpResult<bool>
    where
        F: FnOnce() -> Result<String, std::fmt::Error>,
    {
        if !self.config.should_dump(method) {
            debug!(method = %method, "Method not selected for dumping");
            return Ok(false);
        }
        let record = render()?;
        self.sink.write_dump(&record)?;
        Ok(true)
    }
}

/// CONNECT carries a tunnel, not a request body.
fn is_tunnel<B>(req: &Request<B>) -> bool {
    req.method() == Method::CONNECT
}

/// The forwarded body is empty after a read failure; make the head agree.
fn reset_framing(parts: &mut Parts) {
    parts.headers.remove(TRANSFER_ENCODING);
    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
}

fn report_failure(method: &Method, path: &str, err: &DumpError) {
    let kind = match err {
        DumpError::Capture(e) => e.kind(),
        DumpError::Format(_) => "format",
        DumpError::Sink(_) => "sink",
    };
    error!(method = %method, path = %path, kind, error = %err, "Request dump failed");
    debug!(error = ?err, "Request dump failure detail");
}
