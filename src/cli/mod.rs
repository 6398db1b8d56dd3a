//! CLI module for the carbon operator
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `serve` - Run the reconciliation service
//! - `providers` - Inspect declared provider resources (list)
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Run the service with default config
//! carbon serve
//!
//! # Show declared providers
//! carbon providers list --json
//!
//! # Generate shell completions
//! carbon completions bash > ~/.bash_completion.d/carbon
//! ```

pub mod completions;
pub mod config;
pub mod output;
pub mod providers;
pub mod serve;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Carbon - carbon intensity reconciliation service
#[derive(Parser, Debug)]
#[command(
    name = "carbon",
    version,
    about = "Reconciles carbon-intensity provider resources"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reconciliation service
    Serve(ServeArgs),
    /// Inspect declared provider resources
    #[command(subcommand)]
    Providers(ProvidersCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "carbon.toml")]
    pub config: PathBuf,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CARBON_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Disable the Prometheus exporter
    #[arg(long)]
    pub no_metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProvidersCommands {
    /// List declared provider resources
    List(ProvidersListArgs),
}

#[derive(Args, Debug)]
pub struct ProvidersListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "carbon.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "carbon.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
