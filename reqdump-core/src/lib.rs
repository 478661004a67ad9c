//! reqdump core: transport-agnostic request capture and dump formatting.
//!
//! This library provides the pieces the HTTP middleware in `reqdump-proxy`
//! is assembled from:
//!
//! - [`capture`]: drain a request body once, replay it any number of times
//! - [`dump`]: render the diagnostic dump record
//! - [`timestamp`]: capture timestamps
//! - [`config`]: dump settings (defaults, YAML, environment, init params)
//! - [`sink`]: where dump records go
//! - [`error`]: error types for all of the above
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use reqdump_core::capture::CapturedRequest;
//! use reqdump_core::config::DumpConfig;
//! use reqdump_core::dump::render_request;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DumpConfig::from_env();
//! let req = http::Request::post("/api?id=5").body(Full::new(Bytes::from("{\"a\":1}")))?;
//!
//! let captured = CapturedRequest::capture(req, config.max_body_bytes).await?;
//! println!("{}", render_request(&captured, &config)?);
//!
//! // The body is still there for whoever comes next.
//! let forwarded = captured.into_request();
//! # let _ = forwarded;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod dump;
pub mod error;
pub mod sink;
pub mod timestamp;

pub use capture::{CapturedBody, CapturedRequest, ReplayBody, capture_body};
pub use config::{DumpConfig, MethodFilter};
pub use error::{CaptureError, ConfigError, DumpError, DumpResult};
pub use sink::{DumpSink, MemorySink, StdoutSink, TracingSink};
