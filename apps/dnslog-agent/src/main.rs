//! # dnslog-sync
//!
//! Mirrors a NextDNS profile's query log into a local SQLite database.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Agent Startup                                  │
//! │                                                                         │
//! │  flags / env / config file ──► SyncConfig::load ──► validate           │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │  Database::new (create file, WAL, migrations)                          │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │  SyncOrchestrator::run ◄── Shutdown ◄── Ctrl+C / SIGTERM               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration and database failures exit non-zero before any request is
//! made to the API.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dnslog_db::{Database, DbConfig};
use dnslog_sync::{shutdown, ConfigOverrides, SyncConfig, SyncOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "dnslog-sync", version)]
#[command(about = "Mirror a NextDNS query log into SQLite", long_about = None)]
struct Args {
    /// NextDNS profile ID
    #[arg(long = "profile", env = "NEXTDNS_PROFILE_ID")]
    profile: Option<String>,

    /// NextDNS API key
    #[arg(long = "apikey", env = "NEXTDNS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// SQLite database file (created if missing)
    #[arg(long = "db", env = "DNSLOG_DATABASE")]
    database: Option<PathBuf>,

    /// API base URL
    #[arg(long = "base-url", env = "NEXTDNS_BASE_URL")]
    base_url: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            profile_id: self.profile.clone(),
            api_key: self.api_key.clone(),
            database: self.database.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = SyncConfig::load(args.config.clone(), &args.overrides())
        .context("Invalid configuration")?;
    let db_path = config
        .database_path()
        .context("Database path not configured")?;

    info!(
        profile_id = %config.profile_id(),
        database = %db_path.display(),
        "Starting dnslog-sync"
    );

    let db = Database::new(DbConfig::new(db_path))
        .await
        .context("Failed to open database")?;

    let (handle, signal) = shutdown::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.trigger();
    });

    let mut orchestrator = SyncOrchestrator::from_config(&config, &db, signal)?;
    let result = orchestrator.run().await;
    db.close().await;

    let report = result.context("Sync failed")?;
    info!(
        mode = %report.mode,
        attempts = report.attempts,
        inserted = report.totals.inserted,
        duplicates = report.totals.duplicates,
        skipped = report.totals.skipped,
        cancelled = report.cancelled,
        "Sync finished"
    );
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, finishing current step...");
}
