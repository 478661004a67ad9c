//! reqdump HTTP layer.
//!
//! This crate contains the tower middleware that dumps inbound requests and
//! the small server the `reqdump` binary runs it in.
//!
//! ```no_run
//! use reqdump_core::DumpConfig;
//! use reqdump_proxy::echo::EchoService;
//! use reqdump_proxy::layer::RequestDumpLayer;
//! use reqdump_proxy::logging_layer::logging_layer;
//! use tokio_util::sync::CancellationToken;
//! use tower::ServiceBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ServiceBuilder::new()
//!     .layer(logging_layer())
//!     .layer(RequestDumpLayer::new(DumpConfig::from_env()))
//!     .service(EchoService);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7480").await?;
//! reqdump_proxy::server::serve(listener, service, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod echo;
pub mod error;
pub mod forward_body;
pub mod layer;
pub mod logging_layer;
pub mod server;
pub mod server_config;

pub use forward_body::ForwardBody;
pub use layer::{DumpOutcome, RequestDumpLayer, RequestDumpService};
