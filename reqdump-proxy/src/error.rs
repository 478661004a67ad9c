//! Error types for the reqdump host server.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::UnsyncBoxBody};
use hyper::{Response, StatusCode};
use thiserror::Error;

pub use reqdump_core::error::BoxError;

/// Response body type written by the host server.
pub type ServerBody = UnsyncBoxBody<Bytes, BoxError>;

/// Errors that stop the host server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connections were still open when the drain window closed.
    #[error("drain timeout exceeded with {remaining} open connections")]
    DrainTimeout { remaining: usize },
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Plain-text `500` sent when the wrapped service itself fails.
pub fn internal_error_response() -> Response<ServerBody> {
    let body = Full::new(Bytes::from_static(b"500 Internal Server Error"))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut resp = Response::new(body);
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain"),
    );
    resp
}
