//! http2mqtt - HTTP to MQTT gateway
//!
//! Usage:
//!   http2mqtt [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -b, --bind <ADDR>      HTTP bind address (default: 0.0.0.0:8088)
//!   --broker-host <HOST>   MQTT broker host (default: localhost)
//!   --broker-port <PORT>   MQTT broker port (default: 1883)
//!   --insecure             Disable HTTP Basic authentication
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use http2mqtt::config::Config;
use http2mqtt::{
    ConnectionManager, Gateway, HealthReporter, HttpServer, Metrics, MetricsServer, MqttTransport,
};

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

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// http2mqtt - HTTP to MQTT gateway
#[derive(Parser, Debug)]
#[command(name = "http2mqtt")]
#[command(version)]
#[command(about = "Publish HTTP requests to an MQTT broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// MQTT broker host
    #[arg(long)]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    broker_port: Option<u16>,

    /// Keep alive (and health report interval) in seconds
    #[arg(long)]
    keepalive: Option<u64>,

    /// Disable HTTP Basic authentication
    #[arg(long)]
    insecure: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.http.bind = bind;
        }
        if let Some(host) = &self.broker_host {
            config.mqtt.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.mqtt.port = port;
        }
        if let Some(keepalive) = self.keepalive {
            config.mqtt.keepalive = keepalive;
        }
        if self.insecure {
            config.http.allow_insecure = true;
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // File (optional) + HTTP2MQTT__* + flat deployment variables
    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // CLI args override everything else
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    info!("Starting http2mqtt");
    info!("  HTTP address: {}", config.http.bind);
    info!("  Broker: {}", config.mqtt.address());
    info!("  Client id: {}", config.mqtt.client_id);
    info!("  Keep alive: {}s", config.mqtt.keepalive);
    info!("  Max payload size: {} bytes", config.http.max_payload_size);
    if config.http.allow_insecure {
        warn!("  Authentication: disabled (insecure mode)");
    } else {
        info!("  Authentication: Basic (user '{}')", config.http.username);
    }

    let metrics = Arc::new(Metrics::new());
    let transport = Arc::new(MqttTransport::new(
        config.mqtt.clone(),
        config.http.max_payload_size,
    ));
    let manager = Arc::new(ConnectionManager::new(transport, metrics.clone()));

    match manager.connect().await {
        Ok(()) => info!("Connected to broker at {}", config.mqtt.address()),
        Err(e) => error!(
            "Could not connect to broker at {}: {}; will retry on the next request",
            config.mqtt.address(),
            e
        ),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let health = if config.health.enabled {
        info!(
            "  Health: every {}s to '{}'",
            config.mqtt.keepalive, config.health.topic
        );
        let reporter = HealthReporter::new(
            manager.clone(),
            metrics.clone(),
            config.health.topic.clone(),
            config.mqtt.keepalive_duration(),
        );
        Some(reporter.spawn(shutdown_tx.subscribe()))
    } else {
        info!("  Health: disabled");
        None
    };

    if config.metrics.enabled {
        info!("  Metrics: enabled (http://{})", config.metrics.bind);
        let metrics_server = MetricsServer::new(metrics.clone(), config.metrics.bind);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run(shutdown_rx).await {
                error!("Metrics server error: {}", e);
            }
        });
    } else {
        info!("  Metrics: disabled");
    }

    let gateway = Arc::new(Gateway::new(
        config.http.clone(),
        manager.clone(),
        metrics.clone(),
    ));
    let server = match HttpServer::bind(config.http.bind, gateway).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind HTTP server on {}: {}", config.http.bind, e);
            let _ = shutdown_tx.send(());
            manager.disconnect().await;
            std::process::exit(1);
        }
    };

    let server_task = tokio::spawn(server.run(
        shutdown_tx.subscribe(),
        Duration::from_secs(config.http.shutdown_grace),
    ));

    shutdown_signal().await;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(());

    if let Err(e) = server_task.await {
        error!("HTTP server task failed: {}", e);
    }
    if let Some(health) = health {
        let _ = health.await;
    }

    manager.disconnect().await;
    info!("Stopped");

    Ok(())
}
