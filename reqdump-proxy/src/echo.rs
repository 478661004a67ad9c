//! Terminal handler used by the `reqdump` binary.
//!
//! Answers every request with `200 OK` and the body it received, so a client
//! can confirm the dump middleware handed the payload on unchanged.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::task::{Context, Poll};
use tower::Service;
use tracing::warn;

use crate::error::BoxError;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoService;

impl<B> Service<Request<B>> for EchoService
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
        Box::pin(async move { Ok(echo(req).await) })
    }
}

async fn echo<B>(req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let content_type = req.headers().get(CONTENT_TYPE).cloned();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            let e: BoxError = e.into();
            warn!(error = %e, "Failed to read forwarded body");
            let mut resp = Response::new(Full::new(Bytes::from_static(b"failed to read request body")));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            return resp;
        }
    };

    let mut resp = Response::new(Full::new(body));
    resp.headers_mut().insert(
        CONTENT_TYPE,
        content_type.unwrap_or_else(|| HeaderValue::from_static("application/octet-stream")),
    );
    resp
}
