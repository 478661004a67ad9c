//! Access logging for the host server.
//!
//! Built on `tower_http::trace::TraceLayer`. Every request gets a span that
//! carries a `request_id`, so dump failures logged further down the stack
//! can be matched to the access log line.

use http::HeaderMap;
use std::fmt;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer};
use tracing::{Level, Span, debug, info, warn};

/// Header used to carry a caller-supplied correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Credentials never reach the operational log. The dump record is not
/// affected: it shows headers as received.
const REDACTED_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

const MAX_LOGGED_VALUE_LEN: usize = 256;

pub type AccessLogLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestIdSpan,
    LogRequest,
    LogResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    LogFailure,
>;

/// Access log layer wrapped around the dump middleware by the binary.
pub fn logging_layer() -> AccessLogLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestIdSpan)
        .on_request(LogRequest)
        .on_response(LogResponse)
        .on_failure(LogFailure)
}

/// Opens the per-request span, reusing `x-request-id` when the client sent one.
#[derive(Clone, Debug)]
pub struct RequestIdSpan;

impl<B> MakeSpan<B> for RequestIdSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let request_id = request_id(request.headers());
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

/// Correlation id for a request: the client's `x-request-id`, else a fresh v4 UUID.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[derive(Clone, Debug)]
pub struct LogRequest;

impl<B> OnRequest<B> for LogRequest {
    fn on_request(&mut self, request: &http::Request<B>, _span: &Span) {
        info!(method = %request.method(), uri = %request.uri(), "Request received");

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                version = ?request.version(),
                headers = ?RedactedHeaders(request.headers()),
                "Request headers"
            );
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogResponse;

impl<B> OnResponse<B> for LogResponse {
    fn on_response(self, response: &http::Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Response sent"
        );
    }
}

#[derive(Clone, Debug)]
pub struct LogFailure;

impl OnFailure<ServerErrorsFailureClass> for LogFailure {
    fn on_failure(&mut self, failure: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
        warn!(
            classification = %failure,
            latency_ms = latency.as_millis() as u64,
            "Request failed"
        );
    }
}

/// Debug view of a header map with credentials masked and long values cut.
pub struct RedactedHeaders<'a>(pub &'a HeaderMap);

impl fmt::Debug for RedactedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.0 {
            let name = name.as_str();
            if REDACTED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                map.entry(&name, &"[REDACTED]");
                continue;
            }
            match value.to_str() {
                Ok(v) if v.len() <= MAX_LOGGED_VALUE_LEN => map.entry(&name, &v),
                Ok(v) => map.entry(&name, &format!("{}... ({} bytes)", &v[..MAX_LOGGED_VALUE_LEN], v.len())),
                Err(_) => map.entry(&name, &format!("<binary: {} bytes>", value.len())),
            };
        }
        map.finish()
    }
}
