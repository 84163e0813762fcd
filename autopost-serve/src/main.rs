//! autopost-serve - Local control surface and scheduler host
//!
//! Serves the JSON API used by the browser UI, optionally serves the UI
//! files themselves, and hosts the posting scheduler.

mod api_error;
mod routes;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use libautopost::logging::{LogFormat, LoggingConfig};
use libautopost::{AutopostError, AutopostService, Scheduler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::server::AppState;

#[derive(Parser, Debug)]
#[command(name = "autopost-serve")]
#[command(version)]
#[command(about = "Local control surface and scheduler host for Autopost")]
#[command(long_about = "\
autopost-serve - Local control surface and scheduler host

DESCRIPTION:
    Serves the Autopost JSON API on a local address and runs the posting
    scheduler when asked to. The browser UI talks to the /api routes; pass
    --frontend-dir to serve the UI files from the same address.

USAGE:
    # Serve the API on the default address
    autopost-serve

    # Serve the UI too, open it in the browser and start posting
    autopost-serve --frontend-dir ./frontend --open --autostart

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (stops the scheduler)

DATA:
    All state lives in $AUTOPOST_HOME (default: the platform data
    directory + /autopost): config.json, post_history.json,
    daily_overview.json, analysis_cache.json, note_cache.json, inbox/

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Authentication or configuration error
    3 - Invalid input
")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "AUTOPOST_BIND", default_value = "127.0.0.1:5199")]
    bind: SocketAddr,

    /// Directory with the browser UI files
    #[arg(long, env = "AUTOPOST_FRONTEND_DIR", value_name = "DIR")]
    frontend_dir: Option<PathBuf>,

    /// Open the UI in the system browser once listening
    #[arg(long)]
    open: bool,

    /// Start the posting scheduler immediately
    #[arg(long)]
    autostart: bool,

    /// How often the scheduler wakes to look for due times
    #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = humantime::parse_duration, hide = true)]
    poll_interval: Duration,

    /// Log format: text, json or pretty
    #[arg(long, env = "AUTOPOST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Minimum log level
    #[arg(long, env = "AUTOPOST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, cli.log_level.clone(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("autopost-serve failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<AutopostError>()
            .map(AutopostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = Arc::new(AutopostService::from_env()?);
    info!("Data directory: {}", service.paths().root().display());

    let scheduler =
        Scheduler::new(service.activity().clone()).with_poll_interval(cli.poll_interval);
    let state = Arc::new(AppState::new(service).with_scheduler(scheduler));

    if cli.autostart {
        state.start_scheduler()?;
    }

    if let Some(dir) = &cli.frontend_dir {
        if !dir.is_dir() {
            warn!("Frontend directory {} does not exist", dir.display());
        }
    }
    let app = server::router(state.clone(), cli.frontend_dir.clone());

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!("autopost-serve listening on http://{}", addr);

    if cli.open {
        let url = format!("http://{}", addr);
        if let Err(e) = open::that(&url) {
            warn!("Could not open browser at {}: {}", url, e);
        }
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.scheduler.stop();
    info!("autopost-serve stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            if let Some(signal) = signals.next().await {
                info!("Received signal {}, shutting down gracefully...", signal);
            }
        }
        Err(e) => {
            warn!("Signal setup failed ({}), falling back to Ctrl-C", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Received Ctrl-C, shutting down gracefully...");
}
