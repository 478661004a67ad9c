//! Dump configuration.
//!
//! [`DumpConfig`] is built once at startup and shared read-only by every
//! request. Sources, lowest precedence first:
//!
//! 1. [`DumpConfig::default`]
//! 2. A YAML file ([`load_file`] + [`DumpConfig::with_file`])
//! 3. Environment variables ([`DumpConfig::with_env`])
//! 4. Explicit overrides (CLI flags in the `reqdump` binary)
//!
//! Embedders holding plain key/value settings can use
//! [`DumpConfig::from_params`].
//!
//! # YAML
//!
//! ```yaml
//! methods: "GET, POST"
//! dumpHeaders: true
//! dumpPayload: true
//! maxBodyBytes: 1048576
//! ```

use http::Method;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::capture::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BODY_BYTES};
use crate::error::ConfigError;

pub const PARAM_METHODS: &str = "methods";
pub const PARAM_DUMP_HEADERS: &str = "dumpHeaders";
pub const PARAM_DUMP_PAYLOAD: &str = "dumpPayload";
pub const PARAM_MAX_BODY_BYTES: &str = "maxBodyBytes";

pub const ENV_METHODS: &str = "REQDUMP_METHODS";
pub const ENV_DUMP_HEADERS: &str = "REQDUMP_DUMP_HEADERS";
pub const ENV_DUMP_PAYLOAD: &str = "REQDUMP_DUMP_PAYLOAD";
pub const ENV_MAX_BODY_BYTES: &str = "REQDUMP_MAX_BODY_BYTES";

// ─────────────────────────────────────────────────────────────────────────────
// Method filter
// ─────────────────────────────────────────────────────────────────────────────

/// Which request methods get dumped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MethodFilter {
    /// No filter configured: every method is dumped.
    #[default]
    All,
    /// Only these methods, stored uppercase.
    Only(BTreeSet<String>),
}

impl MethodFilter {
    /// Parse a comma-separated method list.
    ///
    /// Whitespace around entries is ignored and entries are uppercased.
    /// An empty or blank list means [`MethodFilter::All`].
    pub fn parse(list: &str) -> Self {
        let methods: BTreeSet<String> = list
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_ascii_uppercase)
            .collect();

        if methods.is_empty() {
            MethodFilter::All
        } else {
            MethodFilter::Only(methods)
        }
    }

    /// Case-insensitive membership test.
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Only(methods) => methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str())),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, MethodFilter::All)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::All => f.write_str("*"),
            MethodFilter::Only(methods) => {
                let mut first = true;
                for m in methods {
                    if !first {
                        f.write_str(",")?;
                    }
                    f.write_str(m)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DumpConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Process-wide dump settings. Immutable once the middleware is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub method_filter: MethodFilter,

    /// Emit the `HEADERS:` section.
    pub include_headers: bool,

    /// Emit the captured body after the closing separator.
    pub include_body: bool,

    /// Capture ceiling. Larger bodies are forwarded without being dumped.
    pub max_body_bytes: usize,

    /// Frame size used when replaying a captured body downstream.
    pub replay_chunk_size: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            method_filter: MethodFilter::All,
            include_headers: false,
            include_body: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            replay_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DumpConfig {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `REQDUMP_*` environment variables on top of `self`.
    ///
    /// - `REQDUMP_METHODS` (comma-separated, empty = all)
    /// - `REQDUMP_DUMP_HEADERS` (`true`/`false`)
    /// - `REQDUMP_DUMP_PAYLOAD` (`true`/`false`)
    /// - `REQDUMP_MAX_BODY_BYTES` (greater than zero)
    ///
    /// Unparseable or out-of-range values log a warning and keep the current
    /// value.
    pub fn with_env(mut self) -> Self {
        if let Ok(methods) = std::env::var(ENV_METHODS) {
            self.method_filter = MethodFilter::parse(&methods);
        }
        self.include_headers = parse_env_warn(ENV_DUMP_HEADERS, self.include_headers);
        self.include_body = parse_env_warn(ENV_DUMP_PAYLOAD, self.include_body);
        match parse_env_warn(ENV_MAX_BODY_BYTES, self.max_body_bytes) {
            0 => warn!(
                env_var = ENV_MAX_BODY_BYTES,
                default = self.max_body_bytes,
                "Body limit must be greater than zero, using default"
            ),
            limit => self.max_body_bytes = limit,
        }
        self
    }

    /// Apply the fields present in a YAML file.
    pub fn with_file(mut self, file: FileConfig) -> Self {
        if let Some(methods) = file.methods {
            self.method_filter = MethodFilter::parse(&methods);
        }
        if let Some(v) = file.dump_headers {
            self.include_headers = v;
        }
        if let Some(v) = file.dump_payload {
            self.include_body = v;
        }
        if let Some(v) = file.max_body_bytes {
            self.max_body_bytes = v;
        }
        self
    }

    /// Build from key/value init parameters (`methods`, `dumpHeaders`, ...).
    ///
    /// Boolean parameters are `true` only for a case-insensitive `"true"`;
    /// anything else, including absence, is `false`. Unknown keys are ignored
    /// with a warning.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `maxBodyBytes` is not a number or
    /// the result fails [`validate`](Self::validate).
    pub fn from_params<I, K, V>(params: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                PARAM_METHODS => config.method_filter = MethodFilter::parse(value),
                PARAM_DUMP_HEADERS => config.include_headers = parse_flag(value),
                PARAM_DUMP_PAYLOAD => config.include_body = parse_flag(value),
                PARAM_MAX_BODY_BYTES => {
                    config.max_body_bytes =
                        value.trim().parse().map_err(|e| ConfigError::InvalidValue {
                            field: PARAM_MAX_BODY_BYTES.to_string(),
                            message: format!("{e}"),
                        })?;
                }
                other => warn!(param = other, "Ignoring unknown dump parameter"),
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: PARAM_MAX_BODY_BYTES.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.replay_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "replayChunkSize".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a request with `method` should be dumped.
    pub fn should_dump(&self, method: &Method) -> bool {
        self.method_filter.matches(method)
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parse an environment variable with a warning on invalid values.
///
/// Unset variables return `default` silently.
pub fn parse_env_warn<T: std::str::FromStr + fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// YAML file
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub methods: Option<String>,
    pub dump_headers: Option<bool>,
    pub dump_payload: Option<bool>,
    pub max_body_bytes: Option<usize>,
}

/// Read and parse a YAML configuration file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if contents.trim().is_empty() {
        return Err(ConfigError::EmptyConfigFile {
            path: path.to_path_buf(),
        });
    }

    serde_saphyr::from_str(&contents).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
