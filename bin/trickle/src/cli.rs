use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trickle")]
#[command(about = "Trickle faucet claim service", version, long_about = None)]
pub struct Cli {
    /// Path to the configuration file; defaults apply when it does not exist
    #[arg(short, long, value_name = "FILE", default_value = "trickle.toml")]
    pub config: PathBuf,

    /// Listen address
    #[arg(long, value_name = "ADDR")]
    pub addr: Option<String>,

    /// Cooldown ledger backend (memory or sled)
    #[arg(long, value_name = "BACKEND")]
    pub ledger: Option<String>,

    /// Database directory for the sled ledger
    #[arg(long, value_name = "DIR")]
    pub db_path: Option<PathBuf>,

    /// Log level filter
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration with secrets redacted
    ShowConfig,
}
