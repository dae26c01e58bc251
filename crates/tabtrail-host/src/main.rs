//! tabtrail host - native messaging host keeping per-window tab history.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tabtrail_host::{bridge::Bridge, config, event_loop, logging, routes, state};

use event_loop::ObserverQueue;

use logging::{LogConfig, LogFormat};

/// tabtrail host - most-recently-used tab history for the browser extension.
#[derive(Parser, Debug)]
#[command(name = "tabtrail-host")]
#[command(about = "Native messaging host for per-window tab history")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serve the observer feed over HTTP/WebSocket
    #[arg(long)]
    http: bool,

    /// Override the observer feed port (implies --http)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes frame traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "nav=debug" or "bridge::frame=trace")
    /// Can be specified multiple times. Targets are prefixed with "tabtrail::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Browser-supplied arguments (extension origin, parent window handle)
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if cli.http {
        config.http.enabled = true;
    }
    if let Some(port) = cli.port {
        config.http.enabled = true;
        config.http.port = port;
    }

    tracing::info!(
        target: "tabtrail::startup",
        "Loaded configuration (persistence: {:?}, http: {})",
        config.persistence,
        config.http.enabled
    );
    if !cli.browser_args.is_empty() {
        tracing::debug!(target: "tabtrail::startup", "Launched by browser with {:?}", cli.browser_args);
    }

    let (bridge, inbound) = Bridge::spawn(tokio::io::stdin(), tokio::io::stdout(), config.call_timeout());
    let (observers, observer_calls) = ObserverQueue::channel();
    let state = Arc::new(AppState::with_bridge(config.clone(), bridge.clone(), observers));
    tracing::info!(target: "tabtrail::startup", "Bridge connected, waiting for the shim");

    if config.http.enabled {
        let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = routes::router(state.clone());
        tracing::info!(target: "tabtrail::startup", "Observer feed listening on {}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(target: "tabtrail::http", "Observer feed stopped: {}", e);
            }
        });
    }

    event_loop::run(state.engine.clone(), bridge, inbound, observer_calls).await;

    tracing::info!(target: "tabtrail::startup", "Shim disconnected, exiting");
    Ok(())
}
