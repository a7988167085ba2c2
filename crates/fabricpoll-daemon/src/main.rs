//! fabricpoll daemon - main entry point
//!
//! Polls the configured Redfish endpoints on a schedule and serves a
//! read-only status API.

mod api;
mod config;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fabricpoll")]
#[command(about = "Redfish device state poller")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fabricpoll.toml")]
    config: PathBuf,

    /// Bind address for the status API
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run a single crawl of every endpoint and exit
    #[arg(long)]
    poll_once: bool,

    /// Write a sample configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("fabricpoll v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote sample configuration");
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }

    info!(
        endpoints = config.endpoints.len(),
        store = ?config.store.backend,
        "Configuration loaded"
    );

    let bind = config.daemon.bind.clone();
    let state = state::AppState::new(config)?;

    if args.poll_once {
        info!("Running single crawl of every endpoint");
        for (name, result) in state.poll_once_all().await {
            match result {
                Ok(Some(report)) => println!(
                    "{}: visited {}, written {}, unchanged {}, failed reads {}, failed writes {}",
                    name,
                    report.visited,
                    report.written,
                    report.unchanged,
                    report.failed_reads,
                    report.failed_writes
                ),
                Ok(None) => println!("{}: crawl failed, see log", name),
                Err(e) => {
                    error!(name = %name, error = %e, "Poll failed");
                    println!("{}: {}", name, e);
                }
            }
        }
    } else {
        server::run(state, &bind).await?;
    }

    Ok(())
}
