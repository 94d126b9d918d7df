//! One-shot auto-block sweep

use std::sync::Arc;

use chrono::Utc;
use colored::Colorize;

use crate::blocking::{AutoBlockEngine, FraudScheduler};
use crate::detection::FraudThresholds;
use crate::ingestion::SlidingWindowCounter;
use crate::interfaces::cli::CliError;
use crate::storage::{EventStore, SeaOrmStorage};

pub async fn run_sweep(storage: Arc<SeaOrmStorage>, cleanup: bool) -> Result<(), CliError> {
    let config = crate::config::get_config();
    let store: Arc<dyn EventStore> = storage;

    let engine = Arc::new(AutoBlockEngine::new(
        Arc::clone(&store),
        config.auto_block.clone(),
        FraudThresholds::from(&config.fraud),
    ));
    let scheduler = FraudScheduler::new(
        store,
        engine,
        Arc::new(SlidingWindowCounter::default()),
        config.scheduler.clone(),
    );

    let now = Utc::now();
    let report = scheduler
        .run_auto_block(now)
        .await
        .map_err(|e| CliError::CommandError(format!("Auto-block sweep failed: {}", e)))?;

    println!("{}", "Auto-block sweep finished".bold().green());
    println!("  sites analyzed: {}", report.sites.to_string().cyan());
    println!("  new blocks:     {}", report.blocked.to_string().green());
    println!("  expired blocks: {}", report.expired.to_string().yellow());
    if report.failed_sites > 0 {
        println!("  failed sites:   {}", report.failed_sites.to_string().red());
    }

    if cleanup {
        let cleanup_report = scheduler
            .run_cleanup(now)
            .await
            .map_err(|e| CliError::CommandError(format!("Cleanup failed: {}", e)))?;
        println!(
            "  {} {} blocks expired, {} events deleted",
            "Cleanup:".bold(),
            cleanup_report.blocks_expired,
            cleanup_report.events_deleted
        );
    }

    Ok(())
}
