//! VALUEWATCH: put-option scanner and DCF valuation tracker.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens storage, seeds the watch list and then either runs a one-shot
//! command or the periodic service loop with graceful shutdown.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use valuewatch::app::App;
use valuewatch::archive::snapshot::SnapshotRequest;
use valuewatch::cli::{self, Cli, Commands};
use valuewatch::config::{self, AppConfig};
use valuewatch::dashboard;
use valuewatch::types::ScanAck;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("VALUEWATCH_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();
    info!(
        config = %config_path,
        watchlist = cfg.watchlist.len(),
        "VALUEWATCH starting up"
    );

    let app = Arc::new(App::from_config(&cfg).await?);
    let seeded = app
        .seed_watchlist(&cfg.watchlist, &cfg.valuation.default_assumptions)
        .await?;
    if seeded > 0 {
        info!(seeded, "Watch list seeded from config");
    }

    match cli.command() {
        Commands::Run => run_service(app, &cfg).await,
        Commands::Scan => {
            let ack = app.run_scan().await;
            if ack == ScanAck::AlreadyRunning {
                warn!("A scan is already running");
            }
            print_json(&app.scan_view())
        }
        Commands::Valuations { symbols, force } => {
            let filter = cli::symbol_filter(&symbols);
            let summary = app.compute_valuations(filter.as_deref(), force).await?;
            print_json(&summary)
        }
        Commands::Snapshot { date, symbols, force, dry_run } => {
            let request = cli::snapshot_request(date, &symbols, force, dry_run);
            let summary = app.create_quarterly_snapshot(&request).await?;
            print_json(&summary)
        }
        Commands::Compare { symbol } => match app.compare(&symbol).await? {
            Some(comparison) => print_json(&comparison),
            None => anyhow::bail!("{} is not on the watch list", symbol.to_uppercase()),
        },
    }
}

/// Periodic scan, valuation and snapshot check until Ctrl+C.
async fn run_service(app: Arc<App>, cfg: &AppConfig) -> Result<()> {
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(app.clone(), cfg.dashboard.port).await?;
    }

    let mut scan_interval = tokio::time::interval(Duration::from_secs(cfg.scan.interval_secs.max(1)));
    let mut valuation_interval =
        tokio::time::interval(Duration::from_secs(cfg.valuation.interval_secs.max(1)));
    let mut snapshot_interval = tokio::time::interval(Duration::from_secs(
        cfg.valuation.snapshot_check_interval_secs.max(1),
    ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        scan_interval_secs = cfg.scan.interval_secs,
        valuation_interval_secs = cfg.valuation.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = valuation_interval.tick() => {
                match app.compute_valuations(None, false).await {
                    Ok(summary) => info!(
                        requested = summary.requested,
                        eps_success = summary.eps.success,
                        fcf_success = summary.fcf.success,
                        errored = summary.errored,
                        "Scheduled valuation run complete"
                    ),
                    Err(e) => error!(error = %e, "Scheduled valuation run failed, continuing"),
                }
            }
            _ = scan_interval.tick() => {
                match app.trigger_scan() {
                    ScanAck::Accepted { run_id } => info!(%run_id, "Scheduled scan started"),
                    ScanAck::AlreadyRunning => warn!("Previous scan still running, skipping this tick"),
                }
            }
            _ = snapshot_interval.tick() => {
                let evicted = app.evict_expired_cache();
                if evicted > 0 {
                    debug!(evicted, "Expired cache entries evicted");
                }
                // Idempotent: only the first check in a quarter creates snapshots.
                match app.create_quarterly_snapshot(&SnapshotRequest::default()).await {
                    Ok(summary) if summary.created > 0 => info!(
                        period = %summary.period,
                        created = summary.created,
                        "Quarterly snapshots created"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Snapshot check failed, continuing"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    app.storage().close().await;
    info!("VALUEWATCH shut down cleanly.");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("valuewatch=info"));

    let json_logging = std::env::var("VALUEWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
