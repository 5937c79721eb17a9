//! clansync command-line tool.
//!
//! Loads a sync configuration, initializes tracing and runs one of a few
//! diagnostic commands: printing the effective configuration, probing
//! connectivity, or fetching a JSON resource through the retry engine.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clansync::config::{SyncConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, PROBE_USER_AGENT};
use clansync::retry::{ConnectivityProbe, HttpConnectivityProbe};
use clansync::{RetryConfig, SyncContext, SyncError};

/// clansync: chat data synchronization diagnostics
#[derive(Parser, Debug)]
#[command(name = "clansync", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "clansync=debug")
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as TOML
    ShowConfig,
    /// Check connectivity with the configured probe
    Probe {
        /// Override the probe URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Fetch a JSON document over REST with retry and backoff
    Fetch {
        url: String,
        /// Override the configured retry count
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // A missing file at the default path means "use defaults"; an explicit path must exist
    let config = if args.config == DEFAULT_CONFIG_PATH && !Path::new(&args.config).exists() {
        SyncConfig::default()
    } else {
        SyncConfig::load(&args.config)?
    };

    // Priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!(config = %args.config, "Loaded configuration");

    match args.command {
        Command::ShowConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Probe { url } => {
            let url = url.unwrap_or_else(|| config.probe.url.clone());
            let probe = HttpConnectivityProbe::new(url.clone(), config.probe.timeout())?;
            let online = probe.probe().await;
            tracing::info!(%url, online, "Connectivity probe finished");
            println!("{}", if online { "online" } else { "offline" });
            if !online {
                std::process::exit(1);
            }
        }
        Command::Fetch { url, max_retries } => {
            let probe = HttpConnectivityProbe::from_settings(&config.probe)?;
            let client = fetch_client_builder(&config).build()?;
            let mut retry = RetryConfig::from(&config.retry);
            if let Some(max_retries) = max_retries {
                retry = retry.with_max_retries(max_retries);
            }
            let context = SyncContext::with_connectivity_probe(config, Arc::new(probe));

            let body = context
                .retry_engine()
                .run(&retry, || get_json(&client, &url))
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

// Only connection setup is bounded here; each attempt as a whole is bounded by
// the retry timeout.
fn fetch_client_builder(config: &SyncConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(config.probe.timeout())
        .user_agent(PROBE_USER_AGENT)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value, SyncError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Status {
            code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        });
    }
    Ok(response.json().await?)
}
