use clap::Parser;
use tracing::error;

use clickguard::cli::{Cli, Commands, ConfigCommands};
use clickguard::config::{get_config, init_config_from};
use clickguard::runtime::modes::{run_cli, run_server};
use clickguard::system::init_logging;

#[actix_web::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let command = cli.command.unwrap_or(Commands::Serve);

    // 生成配置文件不依赖现有配置
    if let Commands::Config {
        action: ConfigCommands::Generate { .. },
    } = command
    {
        if let Err(e) = run_cli(command).await {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = init_config_from(&cli.config) {
        eprintln!("{}", e.format_colored());
        std::process::exit(1);
    }

    let config = get_config();
    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    match command {
        Commands::Serve => {
            if let Err(e) = run_server().await {
                error!("Server exited with error: {:#}", e);
                std::process::exit(1);
            }
        }
        cmd => {
            if let Err(e) = run_cli(cmd).await {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
        }
    }
}
