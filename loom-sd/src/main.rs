//! Loom Stream Director (loom-sd) - Main entry point
//!
//! Programs a continuous broadcast-style stream: builds the schedule, keeps
//! the on-deck queue current on wall-clock ticks and hands blocks to the
//! playback driver.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use clap::Parser;
use loom_common::config::{self, CONFIG_FILE_ENV, ROOT_FOLDER_ENV};
use loom_common::events::EventBus;
use loom_sd::clock::SystemClock;
use loom_sd::config::SchedulerConfig;
use loom_sd::playback::LoggingDriver;
use loom_sd::scheduler::{StreamScheduler, StreamService};
use loom_sd::store::SqliteStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for loom-sd
#[derive(Parser, Debug)]
#[command(name = "loom-sd")]
#[command(about = "Stream director for Loom")]
#[command(version)]
struct Args {
    /// Root folder holding the database and media
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Run an ad-hoc stream until this RFC 3339 time instead of a continuous one
    #[arg(long, value_parser = parse_end_time)]
    adhoc_until: Option<DateTime<FixedOffset>>,
}

fn parse_end_time(s: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid RFC 3339 time '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = config::load_toml_config_or_default(args.config.as_deref());

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root_folder = config::resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        Some(&toml_config),
    );
    info!("Starting Loom Stream Director");
    info!("Root folder: {}", root_folder.display());

    let db_path = root_folder.join("loom.db");
    let pool = loom_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let scheduler_config = SchedulerConfig::from_toml(&root_folder, &toml_config.scheduler)
        .context("Invalid scheduler configuration")?;
    scheduler_config
        .mirror_to_settings(&pool)
        .await
        .context("Failed to store settings")?;
    debug!(?scheduler_config, "Scheduler configuration");

    let events = EventBus::default();
    spawn_event_logger(&events);

    let scheduler = StreamScheduler::new(
        scheduler_config,
        Arc::new(SqliteStore::new(pool)),
        Arc::new(LoggingDriver::new()),
        Arc::new(SystemClock),
        Box::new(StdRng::from_entropy()),
    )
    .with_events(events);
    let service = StreamService::new(scheduler);

    let status = match args.adhoc_until {
        Some(end_time) => service
            .start_adhoc_stream(end_time)
            .await
            .context("Failed to start ad-hoc stream")?,
        None => match service.resume().await.context("Failed to resume stream")? {
            Some(status) => status,
            None => service
                .start_continuous_stream()
                .await
                .context("Failed to start continuous stream")?,
        },
    };
    info!(
        continuous = status.is_continuous,
        on_deck = status.on_deck_length,
        upcoming = status.upcoming_length,
        "Stream running"
    );

    tokio::select! {
        _ = shutdown_signal() => {
            service.shutdown().await.context("Failed to halt stream")?;
        }
        _ = service.stream_ended() => {
            info!("Stream ended on its own");
        }
    }
    info!("Shutdown complete");
    Ok(())
}

/// Log every event at debug level
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = event.name(), ?event, "Event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger lagged, skipped {} events", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
