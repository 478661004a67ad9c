//! Error types for request capture and dump emission.
//!
//! None of these errors are allowed to reach the host server: the dump
//! middleware inspects them, logs them and forwards the request anyway.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error type produced by arbitrary `http_body::Body` implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while draining a request body into memory.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The underlying body stream failed before it reached end-of-stream.
    #[error("failed to read request body after {bytes_read} bytes: {source}")]
    Read {
        /// Bytes successfully buffered before the failure.
        bytes_read: usize,
        /// Error reported by the body stream.
        #[source]
        source: BoxError,
    },

    /// The body is larger than the configured capture ceiling.
    #[error("request body exceeds capture limit of {limit} bytes")]
    TooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },
}

impl CaptureError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::Read { .. } => "read",
            CaptureError::TooLarge { .. } => "limit",
        }
    }
}

/// Errors on the dump path: capture, formatting or writing to the sink.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The body could not be captured.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// The dump record could not be rendered.
    #[error("failed to render dump record")]
    Format(#[from] std::fmt::Error),

    /// The sink rejected the record.
    #[error("failed to write dump record: {0}")]
    Sink(#[from] std::io::Error),
}

/// Result type alias for dump operations.
pub type DumpResult<T> = Result<T, DumpError>;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is empty or whitespace only.
    #[error("config file {path} is empty")]
    EmptyConfigFile { path: PathBuf },

    /// The configuration file is not valid YAML for this schema.
    #[error("invalid YAML in {path}: {message}")]
    Yaml { path: PathBuf, message: String },

    /// A value is present but cannot be used.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}
