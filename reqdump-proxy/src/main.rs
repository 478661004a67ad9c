//! reqdump - HTTP sidecar that prints every inbound request.
//!
//! Requests are dumped to stdout (or the log) and answered by an echo
//! handler. Operational logs go to stderr as JSON so stdout carries only
//! dump records.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use reqdump_core::config::load_file;
use reqdump_core::{ConfigError, DumpConfig, MethodFilter};
use reqdump_proxy::echo::EchoService;
use reqdump_proxy::layer::RequestDumpLayer;
use reqdump_proxy::logging_layer::logging_layer;
use reqdump_proxy::server::{bind, install_signal_handlers, serve_with_config};
use reqdump_proxy::server_config::{ServerConfig, SinkKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{error, info};

/// Command-line flags. Each one overrides the matching `REQDUMP_*` variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "reqdump", author, version, about, long_about = None)]
struct Cli {
    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Comma-separated methods to dump (default: all)
    #[arg(long)]
    methods: Option<String>,

    /// Include request headers in dumps
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    dump_headers: Option<bool>,

    /// Include request bodies in dumps
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    dump_payload: Option<bool>,

    /// Largest body that is captured and dumped
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// YAML file with dump settings
    #[arg(short, long, env = "REQDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Dump destination: stdout or log
    #[arg(long)]
    sink: Option<SinkKind>,

    /// Maximum lifetime of one connection in seconds
    #[arg(long)]
    connection_timeout_secs: Option<u64>,
}

impl Cli {
    /// Defaults, then the YAML file, then the environment, then flags.
    fn dump_config(&self) -> Result<DumpConfig, ConfigError> {
        let mut config = DumpConfig::default();
        if let Some(path) = &self.config {
            config = config.with_file(load_file(path)?);
        }
        let mut config = config.with_env();

        if let Some(methods) = &self.methods {
            config.method_filter = MethodFilter::parse(methods);
        }
        if let Some(on) = self.dump_headers {
            config.include_headers = on;
        }
        if let Some(on) = self.dump_payload {
            config.include_body = on;
        }
        if let Some(limit) = self.max_body_bytes {
            config.max_body_bytes = limit;
        }

        config.validate()?;
        Ok(config)
    }

    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(sink) = self.sink {
            config.sink = sink;
        }
        if let Some(secs) = self.connection_timeout_secs {
            config.connection_timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The guard flushes buffered log lines on exit.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let dump_config = cli.dump_config().inspect_err(|e| {
        error!(error = %e, "Invalid dump configuration, refusing to start");
    })?;
    let server_config = cli.server_config();

    let dump_layer = RequestDumpLayer::with_sink(dump_config, server_config.sink.build());
    let service = ServiceBuilder::new()
        .layer(logging_layer())
        .layer(dump_layer)
        .service(EchoService);

    let listener = bind(&server_config).await.inspect_err(|e| {
        error!(error = %e, "Failed to bind listener");
    })?;
    info!(
        addr = %server_config.addr(),
        sink = %server_config.sink,
        connection_timeout_secs = server_config.connection_timeout.as_secs(),
        "reqdump listening"
    );

    let shutdown = CancellationToken::new();
    install_signal_handlers(shutdown.clone());

    let result = serve_with_config(listener, service, &server_config, shutdown).await;
    if let Err(e) = &result {
        error!(error = %e, "Shutdown did not complete cleanly");
    }
    info!("reqdump stopped");
    result.map_err(Into::into)
}
