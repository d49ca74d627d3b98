use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cam_relay::catalog::CatalogClient;
use cam_relay::config::{ConfigStore, RuntimeOverrides};
use cam_relay::events::EventBus;
use cam_relay::player::{HeadlessBuffer, HeadlessSurface, StreamClient};
use cam_relay::state::AppState;
use cam_relay::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// cam-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "cam-relay")]
#[command(version, about = "Low-latency camera relay over WebSocket", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $CAM_RELAY_CONFIG or ./cam-relay.json)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server (default)
    Serve(ServeArgs),
    /// Stream a source through a running relay and report latency
    Probe(ProbeArgs),
    /// List camera sources from the catalog
    Sources(SourcesArgs),
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// Listen port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Transcoder binary (overrides config)
    #[arg(long, value_name = "PATH")]
    transcoder: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ProbeArgs {
    /// Source descriptor, e.g. rtsp://camera/stream
    source: String,

    /// Relay endpoint
    #[arg(long, default_value = "ws://127.0.0.1:9999/")]
    relay: String,

    /// Stop after this many seconds (runs until interrupted when omitted)
    #[arg(short = 'd', long, value_name = "SECS")]
    duration: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct SourcesArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long, default_value_t = 50)]
    per_page: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose, args.log_json);

    let config_path = args.config.unwrap_or_else(get_config_path);

    match args.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(serve_args) => serve(config_path, serve_args).await,
        Command::Probe(probe_args) => probe(probe_args).await,
        Command::Sources(sources_args) => sources(config_path, sources_args).await,
    }
}

async fn serve(config_path: PathBuf, args: ServeArgs) -> anyhow::Result<()> {
    tracing::info!("Starting cam-relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Configuration file: {}", config_path.display());

    let config_store = ConfigStore::open(&config_path).await?;
    let overrides = runtime_overrides(&args);
    if !overrides.is_empty() {
        tracing::info!("Command line overrides: {:?}", overrides);
        config_store.set_overrides(overrides);
    }
    let config = config_store.get();

    let events = Arc::new(EventBus::new());
    let state = AppState::new(config_store, events);

    let app = web::create_router(state.clone());

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Relay listening on ws://{}/?streamUrl=<source>", addr);
    tracing::info!("Transcoder: {}", config.transcoder.binary);

    let grace = config.relay.shutdown_grace();
    let shutdown_state = state.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
        }
        tracing::info!("Shutdown signal received");
        cleanup(&shutdown_state, grace).await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve flags that take precedence over the configuration file
fn runtime_overrides(args: &ServeArgs) -> RuntimeOverrides {
    RuntimeOverrides {
        bind_address: args.address.clone(),
        port: args.port,
        transcoder_binary: args.transcoder.clone(),
    }
}

async fn probe(args: ProbeArgs) -> anyhow::Result<()> {
    let mut client = StreamClient::new(&args.relay)?;
    let buffer = Arc::new(HeadlessBuffer::new());
    let surface = Arc::new(HeadlessSurface::new());

    let mut latency = client
        .start_stream(&args.source, buffer.clone(), surface)
        .await?;
    let stats = client
        .stats()
        .context("stream ended before it started")?;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut report = tokio::time::interval(Duration::from_secs(1));
    let mut last_latency = None;

    let end = loop {
        tokio::select! {
            _ = &mut deadline => break client.stop_stream().await,
            _ = tokio::signal::ctrl_c() => break client.stop_stream().await,
            changed = latency.changed() => {
                if changed.is_err() {
                    break client.closed().await;
                }
                last_latency = *latency.borrow_and_update();
            }
            _ = report.tick() => {
                if let Some(ms) = last_latency {
                    println!(
                        "latency {:>7.1} ms | frames {} appended {} busy {} rejected {} | {} bytes",
                        ms,
                        stats.received(),
                        stats.appended(),
                        stats.dropped_busy(),
                        stats.rejected(),
                        buffer.appended_bytes()
                    );
                }
            }
        }
    };

    println!("stream ended: {:?}", end);
    Ok(())
}

async fn sources(config_path: PathBuf, args: SourcesArgs) -> anyhow::Result<()> {
    let config_store = ConfigStore::open(&config_path).await?;
    let catalog = CatalogClient::new(config_store.get().catalog.clone());

    for source in catalog.list_sources(args.page, args.per_page).await? {
        println!(
            "{}\t{}\t{},{}\t{}",
            source.id,
            source.name,
            source.latitude,
            source.longitude,
            source.stream_url.preferred().unwrap_or("-")
        );
    }
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "cam_relay=error,tower_http=error",
        LogLevel::Warn => "cam_relay=warn,tower_http=warn",
        LogLevel::Info => "cam_relay=info,tower_http=info",
        LogLevel::Verbose => "cam_relay=debug,tower_http=info",
        LogLevel::Debug => "cam_relay=debug,tower_http=debug",
        LogLevel::Trace => "cam_relay=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Configuration file location
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("CAM_RELAY_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from("cam-relay.json")
}

/// Close all relay sessions before the server stops
async fn cleanup(state: &Arc<AppState>, grace: Duration) {
    let active = state.relay.registry().len();
    if state.relay.shutdown(grace).await {
        tracing::info!("Relay sessions closed ({} active at shutdown)", active);
    } else {
        tracing::warn!(
            "{} relay session(s) still tearing down after {:?}",
            state.relay.registry().len(),
            grace
        );
    }
}
