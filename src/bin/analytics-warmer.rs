//! # Analytics Cache Warmer
//!
//! Loads configuration, starts the warming scheduler and runs until Ctrl-C.
//!
//! ```bash
//! ANALYTICS_ENV=production ANALYTICS_LOG_FORMAT=json analytics-warmer
//! analytics-warmer --once   # one cycle, then exit
//! ```

use anyhow::Context;
use clap::Parser;
use sales_analytics::config::ConfigManager;
use sales_analytics::logging::init_structured_logging;
use sales_analytics::AnalyticsSystem;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "analytics-warmer")]
#[command(about = "Keep the sales analytics cache warm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Run a single warming cycle, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load analytics configuration")?;
    info!(
        environment = manager.environment(),
        config_directory = %manager.config_directory().display(),
        "Configuration loaded"
    );

    let system = AnalyticsSystem::from_config(manager.config().clone())
        .await
        .context("failed to build analytics system")?;

    if cli.once {
        let summary = system.trigger_cache_warming().await;
        info!(
            successes = summary.successes(),
            errors = summary.errors(),
            duration_ms = summary.duration_ms,
            "Single warming cycle finished"
        );
        system.shutdown().await;
        return Ok(());
    }

    if !system.start_warming() {
        warn!("Warming scheduler not started; waiting for shutdown signal only");
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!(error = %err, "Failed to listen for shutdown signal"),
    }

    system.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_once_flag() {
        assert!(!Cli::try_parse_from(["analytics-warmer"]).unwrap().once);
        assert!(Cli::try_parse_from(["analytics-warmer", "--once"]).unwrap().once);
        assert!(Cli::try_parse_from(["analytics-warmer", "--twice"]).is_err());
    }
}
