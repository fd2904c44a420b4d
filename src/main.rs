// qnotify: disk quota notification tool

use clap::Parser;
use config::Config;

// Module declarations
mod backends;
mod cli;
mod commands;
mod config;
mod evaluate;
mod ledger;
mod models;
mod notify;
mod output;
mod runner;
mod system;
mod utils;

use cli::args::{Cli, Commands};
use commands::check::handle_check_command;
use commands::validate::handle_validate_command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Check { dry_run } => handle_check_command(&config, dry_run, cli.json).await,
        Commands::Validate => handle_validate_command(&config),
    };

    // Non-zero exit only for configuration and ledger failures; a completed
    // run with unavailable filesystems still exits zero.
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
