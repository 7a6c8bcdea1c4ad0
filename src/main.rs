use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use ticketwatch::config::{Config, LoggingConfig};
use ticketwatch::dedup::DedupStore;
use ticketwatch::notify::Notifier;
use ticketwatch::scheduler::Poller;
use ticketwatch::sources::build_source;

fn config_path() -> PathBuf {
    std::env::var("TICKETWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ticketwatch.toml"))
}

fn init_logging(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let path = config_path();
    let config = if path.exists() {
        Config::load(&path)?
    } else {
        Config::from_env()?
    };

    init_logging(&config.logging);

    info!("ticketwatch v{} starting", env!("CARGO_PKG_VERSION"));
    if !path.exists() {
        info!(path = %path.display(), "no config file found, using env-only config");
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return Err(e.into());
    }

    if config.notify.dry_run {
        warn!("notify.dry_run=true - messages will be logged, not sent");
    }

    let source = build_source(&config.source)?;
    let notifier = Notifier::from_config(&config.notify, &config.selection.currency_symbol)?;
    let poller = Arc::new(Poller::from_config(
        &config,
        source,
        DedupStore::new(),
        notifier,
    ));

    info!(
        kind = %config.source.kind,
        url = %config.source.url,
        mark = ?config.source.mark_policy(),
        cycle_timeout_secs = config.scheduler.cycle_timeout_secs,
        "source configured"
    );

    tokio::select! {
        _ = poller.clone().run() => {
            error!("poller stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            let stats = poller.stats();
            info!(
                cycles = stats.cycles,
                fetch_failures = stats.fetch_failures,
                timeouts = stats.timeouts,
                notifications = stats.notifications,
                seen = poller.dedup().len(),
                "shutting down..."
            );
        }
    }

    Ok(())
}
