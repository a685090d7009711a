//! StompMQ - Embeddable STOMP 1.1 broker over WebSocket
//!
//! Usage:
//!   stompmq [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -b, --bind <ADDR>      Bind address (default: 0.0.0.0:15674)
//!   -p, --path <PATH>      WebSocket upgrade path (default: /stomp)
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stompmq::broker::Broker;
use stompmq::config::Config;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// StompMQ - STOMP 1.1 broker over WebSocket
#[derive(Parser, Debug)]
#[command(name = "stompmq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Embeddable STOMP 1.1 message broker over WebSocket")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP bind address for the WebSocket listener
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// WebSocket upgrade path
    #[arg(short, long)]
    path: Option<String>,

    /// Value for the CONNECTED server header
    #[arg(long)]
    server_name: Option<String>,

    /// Heartbeat send interval (sx) in milliseconds
    #[arg(long)]
    heartbeat_send: Option<u64>,

    /// Heartbeat receive interval (sy) in milliseconds
    #[arg(long)]
    heartbeat_receive: Option<u64>,

    /// Maximum frame size in bytes
    #[arg(long)]
    max_frame_size: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise use defaults
    let file_config = if let Some(config_path) = &args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error loading config file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = args.log_level.unwrap_or_else(|| {
        match file_config.log.level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    // CLI args override file config
    let mut broker_config = file_config.broker_config();
    if let Some(bind) = args.bind {
        broker_config.bind_addr = bind;
    }
    if let Some(path) = args.path {
        broker_config.path = path;
    }
    if let Some(name) = args.server_name {
        broker_config.server_name = name;
    }
    if let Some(sx) = args.heartbeat_send {
        broker_config.heartbeat[0] = sx;
    }
    if let Some(sy) = args.heartbeat_receive {
        broker_config.heartbeat[1] = sy;
    }
    if let Some(max) = args.max_frame_size {
        broker_config.max_frame_size = max;
    }

    info!("Starting StompMQ broker");
    info!("  Bind address: {}", broker_config.bind_addr);
    info!("  Upgrade path: {}", broker_config.path);
    info!(
        "  Heartbeat: {},{} (margin {} ms)",
        broker_config.heartbeat[0], broker_config.heartbeat[1],
        broker_config.heartbeat_error_margin_ms
    );
    info!("  Max frame size: {} bytes", broker_config.max_frame_size);

    let broker = Broker::new(broker_config);

    // Shut down cleanly on Ctrl+C
    {
        let broker = broker.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                broker.shutdown();
            }
        });
    }

    broker.run().await?;
    Ok(())
}
