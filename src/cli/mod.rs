//! Command-line interface for the exporter.
//!
//! Run `heka_exporter -c metrics.json` to listen for framed records on UDP
//! and serve the resulting metrics on `/metrics`.

use crate::core::{BridgeError, Config, ConfigBuilder, Result};
use crate::receiver::{Bridge, Listeners};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Turn framed Heka records into Prometheus metrics
#[derive(Parser, Debug)]
#[command(name = "heka_exporter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// UDP address to listen for framed records on [default: 0.0.0.0:50569]
    #[arg(short = 'l', long, env = "HEKA_EXPORTER_LISTEN_UDP")]
    pub listen_udp: Option<SocketAddr>,

    /// TCP address to listen for framed records on
    #[arg(long, env = "HEKA_EXPORTER_LISTEN_TCP")]
    pub listen_tcp: Option<SocketAddr>,

    /// Address to expose metrics on [default: 0.0.0.0:9137]
    #[arg(short = 'H', long, env = "HEKA_EXPORTER_LISTEN_HTTP")]
    pub listen_http: Option<SocketAddr>,

    /// Path to the metric rules (JSON, or YAML for any other extension)
    #[arg(short, long, env = "HEKA_EXPORTER_CONFIG", default_value = "metrics.json")]
    pub config: PathBuf,

    /// Largest payload a frame may declare, in bytes
    #[arg(long, env = "HEKA_EXPORTER_MAX_MESSAGE_SIZE")]
    pub max_message_size: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, env = "HEKA_EXPORTER_DEBUG")]
    pub debug: bool,

    /// Load the rules, print a summary and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration: file first, then CLI and environment overrides.
    pub async fn load_config(&self) -> Result<Config> {
        let builder = ConfigBuilder::new().from_file(&self.config).await?;
        tracing::info!("Loaded configuration from {:?}", self.config);
        self.apply_overrides(builder).build()
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(addr) = self.listen_udp {
            builder = builder.udp_address(Some(addr));
        }
        if let Some(addr) = self.listen_tcp {
            builder = builder.tcp_address(Some(addr));
        }
        if let Some(addr) = self.listen_http {
            builder = builder.http_address(addr);
        }
        if let Some(size) = self.max_message_size {
            builder = builder.max_message_size(size);
        }
        builder.debug(self.debug)
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins, then `HEKA_EXPORTER_LOG_LEVEL`, then `info`.
    /// `--debug` forces `debug`.
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = std::env::var("HEKA_EXPORTER_LOG_LEVEL")
                    .unwrap_or_else(|_| "info".to_string());
                EnvFilter::new(level)
            })
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| BridgeError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the exporter.
pub async fn execute(cli: Cli) -> Result<()> {
    cli.init_logging()?;

    let config = cli.load_config().await?;
    let bridge = Bridge::new(&config)?;

    if cli.check_config {
        print_summary(&config, &bridge);
        return Ok(());
    }

    let listeners = Listeners::bind(&config.server).await?;
    tracing::info!(
        "Exporting {} metric rules, scrape endpoint on {}",
        bridge.engine().len(),
        config.server.http_address
    );
    listeners.serve(bridge).await
}

fn print_summary(config: &Config, bridge: &Bridge) {
    println!("Configuration is valid!");
    if let Some(addr) = config.server.udp_address {
        println!("  UDP listener: {}", addr);
    }
    if let Some(addr) = config.server.tcp_address {
        println!("  TCP listener: {}", addr);
    }
    println!("  Scrape endpoint: http://{}/metrics", config.server.http_address);
    println!("  Max message size: {} bytes", config.ingest.max_message_size);
    println!("  Metric rules: {}", bridge.engine().len());
    for rule in bridge.engine().rules() {
        println!("    {} ({}) labels={:?}", rule.name(), rule.kind().as_str(), rule.label_names());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["heka_exporter"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("metrics.json"));
        assert!(cli.listen_udp.is_none());
        assert!(!cli.debug);
        assert!(!cli.check_config);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "heka_exporter",
            "-l",
            "127.0.0.1:5565",
            "-H",
            "127.0.0.1:9000",
            "--listen-tcp",
            "127.0.0.1:5566",
            "-c",
            "rules.yaml",
            "-d",
        ])
        .unwrap();
        assert_eq!(cli.listen_udp, Some("127.0.0.1:5565".parse().unwrap()));
        assert_eq!(cli.listen_tcp, Some("127.0.0.1:5566".parse().unwrap()));
        assert_eq!(cli.listen_http, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(cli.config, PathBuf::from("rules.yaml"));
        assert!(cli.debug);
    }

    #[test]
    fn test_bad_address_rejected() {
        assert!(Cli::try_parse_from(["heka_exporter", "-l", "not-an-address"]).is_err());
    }

    #[tokio::test]
    async fn test_overrides_win_over_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"server": {{"http_address": "127.0.0.1:9001"}}, "metrics": [{{"name": "c", "type": "counter"}}]}}"#
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "heka_exporter",
            "-c",
            file.path().to_str().unwrap(),
            "-H",
            "127.0.0.1:9002",
            "--max-message-size",
            "2048",
        ])
        .unwrap();
        let config = cli.load_config().await.unwrap();
        assert_eq!(config.server.http_address.port(), 9002);
        assert_eq!(config.ingest.max_message_size, 2048);
        assert_eq!(config.metrics.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let cli = Cli::try_parse_from(["heka_exporter", "-c", "/nonexistent/metrics.json"]).unwrap();
        let err = cli.load_config().await.unwrap_err();
        assert_eq!(err.category(), "config");
    }
}
