use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailman_digest_ingest::config::Config;
use mailman_digest_ingest::db::{clear_items, count_items, Database};
use mailman_digest_ingest::pipeline::{self, Collaborators};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let reset = std::env::args().skip(1).any(|arg| arg == "--reset");

    info!("Starting mailman-digest-ingest");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        lists = ?config.mailing_lists,
        period = %config.archive_period,
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    if reset {
        let removed = clear_items(db.pool()).await?;
        warn!(removed, "Cleared item catalog");
    }

    let existing = count_items(db.pool()).await?;
    info!(items = existing, "Database initialized");

    let collaborators = Collaborators::from_config(&config).await?;

    if config.ingest_interval.is_zero() {
        let summary = tokio::select! {
            summary = pipeline::run_once(&config, &db, &collaborators) => summary,
            () = shutdown_signal() => {
                info!("Interrupted before the run finished");
                return Ok(());
            }
        };

        if summary.all_logins_failed() {
            anyhow::bail!(
                "Login failed for all {} configured sources",
                summary.failures.len()
            );
        }
        info!(
            inserted = summary.inserted(),
            failed_sources = summary.failures.len(),
            "Ingest complete"
        );
        return Ok(());
    }

    info!(
        interval_secs = config.ingest_interval.as_secs(),
        "Starting ingest loop"
    );
    let loop_handle = tokio::spawn(pipeline::run_loop(config, db, collaborators));

    shutdown_signal().await;

    info!("Shutting down...");
    loop_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailman_digest_ingest=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
