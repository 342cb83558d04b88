//! Thinking proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                 THINKING PROXY                   │
//!                     │                                                  │
//!   Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ──────────────────┼─▶│   net    │──▶│ request  │──▶│   rewrite    │  │
//!   (front port)      │  │ listener │   │  reader  │   │  (thinking)  │  │
//!                     │  └──────────┘   └──────────┘   └──────┬───────┘  │
//!                     │                                       ▼          │
//!   Client Response   │                 ┌──────────┐   ┌──────────────┐  │
//!   ◀─────────────────┼─────────────────│  relay   │◀──│  forwarder   │◀─┼── Backend
//!                     │                 └──────────┘   └──────────────┘  │   (backend port)
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use thinking_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use thinking_proxy::observability::{logging, metrics};
use thinking_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "thinking-proxy")]
#[command(about = "Rewrites -thinking-<N> model suffixes into thinking budgets", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Front listener address, e.g. 127.0.0.1:8317.
    #[arg(long)]
    listen: Option<String>,

    /// Backend address, e.g. 127.0.0.1:8318.
    #[arg(long)]
    backend: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration, print it and exit.
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(backend) = &self.backend {
            config.backend.address = backend.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    if cli.check_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        hard_cap = config.thinking.hard_cap,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let drain = Duration::from_secs(config.timeouts.drain_secs);
    let server = ProxyServer::new(config);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.stop().await;
    if !server.tracker().wait_idle(drain).await {
        tracing::warn!(
            remaining = server.tracker().active_count(),
            "Exiting with connections still open"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
