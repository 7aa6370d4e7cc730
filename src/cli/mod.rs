//! CLI interface for lotgate
//!
//! Provides subcommands for:
//! - `run`: Start the live trading cycle
//! - `status`: Show recent journal entries
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lotgate")]
#[command(about = "Live order execution and risk control engine for a retail trading bot")]
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
    /// Start the live trading cycle
    Run(RunArgs),
    /// Show recent journal entries
    Status,
    /// Show the effective configuration
    Config,
}
