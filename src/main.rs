//! gitvault - durable key/value storage on a Git content API
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use gitvault::cli::commands;
use gitvault::cli::{Cli, Commands};
use gitvault::config::{Config, ConfigManager};
use gitvault::error::{VaultError, VaultResult};
use gitvault::Vault;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> VaultResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);

    // Config command doesn't need the remote
    if let Commands::Config(args) = cli.command {
        return commands::config(args, &config, &config_manager).await;
    }

    let vault = Vault::open(&config).await?;

    let result = match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Status => commands::status(&vault, &config).await,
        Commands::Get(args) => commands::get(args, &vault).await,
        Commands::Set(args) => commands::set(args, &vault).await,
        Commands::Flush => commands::flush(&vault).await,
        Commands::Backup => commands::backup(&vault).await,
        Commands::Large(args) => commands::large(args, &vault).await,
    };

    // Always flush before exit, even when the command failed
    let report = vault.shutdown().await;
    result?;

    if !report.is_clean() {
        commands::flush::print_report(&report);
        return Err(VaultError::User(format!(
            "{} path(s) could not be saved before exit",
            report.failed.len()
        )));
    }
    Ok(())
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("gitvault=warn"),
        1 => EnvFilter::new("gitvault=info"),
        _ => EnvFilter::new("gitvault=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
