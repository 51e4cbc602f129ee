use anyhow::Result;
use tracing::{Level, info, warn};

use dnssec_sync::{Reconciler, SyncConfig, config::mask_secret};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all required settings
    let config = SyncConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the DNSSEC_SYNC_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting DNSSEC sync");
    info!(
        "Registrar {} (user {}), PowerDNS {} (API key {})",
        config.registrar.url,
        config.registrar.username,
        config.powerdns.url,
        mask_secret(&config.powerdns.api_key)
    );

    let reconciler = Reconciler::from_config(&config)?;
    let report = reconciler.run().await?;

    info!(
        "All jobs done: {} registered, {} skipped, {} failed",
        report.registered(),
        report.skipped(),
        report.failed()
    );
    if report.failed() > 0 {
        warn!("{} zones need attention", report.failed());
    }

    Ok(())
}

/// Initialize logging based on configuration
fn init_logging(config: &SyncConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
