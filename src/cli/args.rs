use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "qnotify")]
#[command(about = "Notify users when their disk usage passes configured thresholds")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<String>,

    /// Set output verbosity to warning (-v), info (-vv), or debug (-vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// JSON output format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check quotas and send pending notifications
    Check {
        /// Compute decisions without touching the ledger or sending mail
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and exit without querying
    Validate,
}
