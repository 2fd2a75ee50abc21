//! Kiln - lock-file restore engine
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::{Cli, Commands};
use kiln::config::{ConfigManager, ProxyConfig};
use kiln::error::KilnResult;
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

async fn run() -> KilnResult<()> {
    let cli = Cli::parse();

    // 0 = warn, 1 = info (fetch log), 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;

    if let Some(dir) = cli.cache_dir {
        config.cache.dir = Some(dir);
    }
    // The environment is read here once; the library never looks at it
    if !config.proxy.is_configured() {
        if let Some(proxy) = ProxyConfig::from_env() {
            debug!("Using proxy from environment");
            config.proxy.url = proxy.url;
        }
    }

    match cli.command {
        Commands::Resolve(args) => kiln::cli::commands::resolve(args, &config).await,
        Commands::Restore(args) => kiln::cli::commands::restore(args, &config).await,
        Commands::Fetch(args) => kiln::cli::commands::fetch(args, &config).await,
        Commands::Cache(args) => kiln::cli::commands::cache(args, &config).await,
    }
}
