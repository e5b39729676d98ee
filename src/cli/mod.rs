//! CLI interface for margin-ledger
//!
//! Provides subcommands for:
//! - `run`: Start the ledger, risk controller, and signal gateway
//! - `status`: Show saved account state
//! - `config`: Show effective configuration

mod run;
mod status;

pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "margin-ledger")]
#[command(about = "Leveraged paper-trading ledger with stop-loss, take-profit and a daily kill switch")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ledger; signals are read as JSON lines from stdin
    Run(RunArgs),
    /// Show saved account state
    Status(StatusArgs),
    /// Show effective configuration
    Config,
}
