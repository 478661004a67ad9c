//! HTTP/1.1 and HTTP/2 host for a tower service.
//!
//! One task per accepted connection. Each connection, keep-alive included,
//! lives at most `connection_timeout`. On shutdown connections are asked to
//! finish in-flight requests and the loop waits up to `drain_timeout` for
//! them.

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, ServerError, ServerResult, internal_error_response};
use crate::server_config::ServerConfig;

/// How long one connection gets to close after shutdown is signalled.
const CONNECTION_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Bind the listening socket described by `config`.
pub async fn bind(config: &ServerConfig) -> ServerResult<TcpListener> {
    let addr = config.addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve `service` on `listener` with default connection settings until
/// `shutdown` is cancelled.
pub async fn serve<S, B>(listener: TcpListener, service: S, shutdown: CancellationToken) -> ServerResult<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    serve_with_config(listener, service, &ServerConfig::default(), shutdown).await
}

pub async fn serve_with_config<S, B>(
    listener: TcpListener,
    service: S,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> ServerResult<()>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let tracker = TaskTracker::new();
    let connection_timeout = config.connection_timeout;

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Per-connection accept errors (EMFILE, resets) do not stop the server.
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                if let Err(e) = configure_tcp_stream(&stream, config) {
                    debug!(peer = %peer, error = %e, "Failed to configure socket");
                }

                let service = service.clone();
                let conn_shutdown = shutdown.clone();
                tracker.spawn(async move {
                    let conn = handle_connection(stream, peer, service, conn_shutdown);
                    if tokio::time::timeout(connection_timeout, conn).await.is_err() {
                        warn!(
                            peer = %peer,
                            timeout_secs = connection_timeout.as_secs(),
                            "Connection lifetime exceeded, dropping"
                        );
                    }
                });
            }
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);
    tracker.close();

    if tokio::time::timeout(config.drain_timeout, tracker.wait()).await.is_err() {
        let remaining = tracker.len();
        warn!(remaining, "Drain timeout exceeded");
        return Err(ServerError::DrainTimeout { remaining });
    }

    info!("All connections closed");
    Ok(())
}

async fn handle_connection<S, B>(stream: TcpStream, peer: SocketAddr, service: S, shutdown: CancellationToken)
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let io = TokioIo::new(stream);

    let svc_fn = hyper::service::service_fn(move |req| {
        let svc = service.clone();
        async move {
            let result: Result<_, Infallible> = match svc.oneshot(req).await {
                Ok(response) => Ok(response.map(|body| {
                    body.map_err(|e| -> BoxError { e.into() }).boxed_unsync()
                })),
                Err(e) => {
                    error!(error = %e, "Service error");
                    Ok(internal_error_response())
                }
            };
            result
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(io, svc_fn);
    tokio::pin!(conn);

    tokio::select! {
        result = &mut conn => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        }
        _ = shutdown.cancelled() => {
            debug!(peer = %peer, "Closing connection for shutdown");
            conn.as_mut().graceful_shutdown();
            let _ = tokio::time::timeout(CONNECTION_CLOSE_GRACE, conn).await;
        }
    }
}

fn configure_tcp_stream(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.tcp_keepalive_secs));
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Cancel `shutdown` on SIGINT, or SIGTERM on Unix.
pub fn install_signal_handlers(shutdown: CancellationToken) {
    let on_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, shutting down");
                on_sigint.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    });

    #[cfg(not(unix))]
    let _ = shutdown;
}
