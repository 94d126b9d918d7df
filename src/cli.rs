//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for clickguard using clap's derive macros.

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// ClickGuard - ad-click fraud scoring and auto-block service
#[derive(Parser)]
#[command(name = "clickguard")]
#[command(version)]
#[command(about = "Ad-click fraud scoring and auto-block service", long_about = None)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Manage tracked sites
    Site {
        #[command(subcommand)]
        action: SiteCommands,
    },

    /// Run one auto-block pass over all active sites, then expire stale blocks
    Sweep {
        /// Also delete click events older than the retention period
        #[arg(long)]
        cleanup: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Site management commands
#[derive(Subcommand)]
pub enum SiteCommands {
    /// Register a site and print its API key
    Add {
        /// Display name
        name: String,

        /// Site domain (e.g. example.com)
        domain: String,

        /// Use this API key instead of generating one
        #[arg(long)]
        api_key: Option<String>,
    },

    /// List all sites
    List,
}

/// Configuration management commands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite without confirmation
        #[arg(long)]
        force: bool,
    },
}
