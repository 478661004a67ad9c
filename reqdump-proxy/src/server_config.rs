//! Host server settings.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `REQDUMP_BIND` | `0.0.0.0` |
//! | `REQDUMP_PORT` | `7480` |
//! | `REQDUMP_CONNECTION_TIMEOUT_SECS` | `300` |
//! | `REQDUMP_DRAIN_TIMEOUT_SECS` | `10` |
//! | `REQDUMP_TCP_NODELAY` | `true` |
//! | `REQDUMP_TCP_KEEPALIVE_SECS` | `60` |
//! | `REQDUMP_SINK` | `stdout` |

use reqdump_core::config::parse_env_warn;
use reqdump_core::{DumpSink, StdoutSink, TracingSink};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 7480;

/// Where the binary sends dump records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Plain text on standard output.
    #[default]
    Stdout,
    /// `info` events on the `reqdump::dump` tracing target.
    Log,
}

impl SinkKind {
    pub fn build(self) -> Arc<dyn DumpSink> {
        match self {
            SinkKind::Stdout => Arc::new(StdoutSink),
            SinkKind::Log => Arc::new(TracingSink),
        }
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(SinkKind::Stdout),
            "log" => Ok(SinkKind::Log),
            other => Err(format!("unknown sink '{other}', expected 'stdout' or 'log'")),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Stdout => f.write_str("stdout"),
            SinkKind::Log => f.write_str("log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,

    /// Upper bound on the lifetime of one connection, keep-alive included.
    /// A connection still open when it expires is dropped, even mid-request.
    pub connection_timeout: Duration,

    /// How long shutdown waits for open connections.
    pub drain_timeout: Duration,

    pub tcp_nodelay: bool,
    pub tcp_keepalive_secs: u64,

    pub sink: SinkKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            connection_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            tcp_keepalive_secs: 60,
            sink: SinkKind::Stdout,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `REQDUMP_*` variables. Unparseable values warn
    /// and keep the default.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bind: std::env::var("REQDUMP_BIND").unwrap_or(default.bind),
            port: parse_env_warn("REQDUMP_PORT", default.port),
            connection_timeout: Duration::from_secs(parse_env_warn(
                "REQDUMP_CONNECTION_TIMEOUT_SECS",
                default.connection_timeout.as_secs(),
            )),
            drain_timeout: Duration::from_secs(parse_env_warn(
                "REQDUMP_DRAIN_TIMEOUT_SECS",
                default.drain_timeout.as_secs(),
            )),
            tcp_nodelay: parse_env_warn("REQDUMP_TCP_NODELAY", default.tcp_nodelay),
            tcp_keepalive_secs: parse_env_warn("REQDUMP_TCP_KEEPALIVE_SECS", default.tcp_keepalive_secs),
            sink: parse_env_warn("REQDUMP_SINK", default.sink),
        }
    }

    /// `host:port` for the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
