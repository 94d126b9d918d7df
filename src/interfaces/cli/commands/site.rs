//! Site management commands

use std::sync::Arc;

use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::storage::{EventStore, NewSite, SeaOrmStorage};

pub async fn add_site(
    storage: Arc<SeaOrmStorage>,
    name: String,
    domain: String,
    api_key: Option<String>,
) -> Result<(), CliError> {
    let site = storage
        .create_site(NewSite {
            name,
            domain,
            api_key,
            ..Default::default()
        })
        .await
        .map_err(|e| CliError::CommandError(format!("Failed to add site: {}", e)))?;
    storage.invalidate_site_cache();

    println!(
        "{} Site {} ({}) registered with id {}",
        "✓".bold().green(),
        site.name.cyan(),
        site.domain.blue(),
        site.id.to_string().green()
    );
    println!("  {} {}", "API key:".bold(), site.api_key.yellow());
    Ok(())
}

pub async fn list_sites(storage: Arc<SeaOrmStorage>) -> Result<(), CliError> {
    let sites = storage
        .list_sites()
        .await
        .map_err(|e| CliError::CommandError(format!("Failed to load sites: {}", e)))?;

    if sites.is_empty() {
        println!("{} No sites found", "ℹ".bold().blue());
        return Ok(());
    }

    println!("{}", "Site list:".bold().green());
    println!();
    for site in &sites {
        let mut info_parts = vec![format!(
            "[{}] {} -> {}",
            site.id,
            site.name.cyan(),
            site.domain.blue().underline()
        )];

        info_parts.push(format!("key: {}", site.api_key).dimmed().to_string());

        if !site.is_active {
            info_parts.push("(inactive)".yellow().to_string());
        }

        if let Some(threshold) = site.fraud_score_threshold {
            info_parts.push(
                format!("(threshold: {})", threshold)
                    .dimmed()
                    .cyan()
                    .to_string(),
            );
        }

        println!("  {}", info_parts.join(" "));
    }
    println!();
    println!(
        "{} Total {} sites",
        "ℹ".bold().blue(),
        sites.len().to_string().green()
    );
    Ok(())
}
