//! depcache - Dependency resolution cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depcache::cli::{Cli, Commands};
use depcache::config::{Config, ConfigManager};
use depcache::error::DepcacheResult;
use std::process::ExitCode;
use tracing::debug;
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

async fn run() -> DepcacheResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config file {}", config_manager.path().display());

    apply_overrides(&cli, &mut config);

    // Dispatch to command
    match cli.command {
        Commands::Resolve(args) => depcache::cli::commands::resolve(args, &config).await,
        Commands::Refresh(args) => depcache::cli::commands::refresh(args, &config).await,
        Commands::Upgrade(args) => depcache::cli::commands::upgrade(args, &config).await,
        Commands::Cache(args) => depcache::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            depcache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("depcache=warn"),
        1 => EnvFilter::new("depcache=info"),
        _ => EnvFilter::new("depcache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}

/// Command-line flags win over the config file
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(ref dir) = cli.cache_dir {
        config.cache.dir = Some(dir.clone());
    }
    if let Some(jobs) = cli.jobs {
        config.bulk.max_concurrent = Some(jobs);
    }
    if let Some(ref solver) = cli.solver {
        config.resolver.command = solver.clone();
    }
}
