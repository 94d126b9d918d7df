//! CLI interface module
//!
//! One-shot maintenance commands that talk to the storage backend directly.

pub mod commands;

use std::fmt;

use crate::cli::{Commands, ConfigCommands, SiteCommands};
use crate::storage::StorageFactory;
use commands::{add_site, config_generate, list_sites, run_sweep};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::ClickGuardError> for CliError {
    fn from(err: crate::errors::ClickGuardError) -> Self {
        CliError::StorageError(err.to_string())
    }
}

/// Run a CLI command from clap-parsed input
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    // Generate doesn't need DB connection
    if let Commands::Config {
        action: ConfigCommands::Generate { output_path, force },
    } = cmd
    {
        return config_generate(output_path, force).await;
    }

    let storage = StorageFactory::create()
        .await
        .map_err(|e| CliError::StorageError(e.to_string()))?;

    match cmd {
        Commands::Site { action } => match action {
            SiteCommands::Add {
                name,
                domain,
                api_key,
            } => add_site(storage, name, domain, api_key).await,
            SiteCommands::List => list_sites(storage).await,
        },

        Commands::Sweep { cleanup } => run_sweep(storage, cleanup).await,

        Commands::Serve => Err(CliError::CommandError(
            "serve is handled by the server mode".to_string(),
        )),

        Commands::Config { .. } => unreachable!("handled above"),
    }
}
