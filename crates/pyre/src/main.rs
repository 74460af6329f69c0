//! pyre: Steem burn pool posting agent
//!
//! Main binary with subcommands:
//! - `run`: Post on a fixed interval until stopped
//! - `check`: Validate configuration and verify the account
//! - `preview`: Print the post that would be published

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod content;
mod daemon;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "pyre")]
#[command(about = "Scheduled Steem burn pool posting agent", long_about = None, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the posting daemon
    Run {
        /// Path to the JSON config file
        #[arg(long, env = "PYRE_CONFIG", default_value = "config.json")]
        config: PathBuf,

        /// Log posts instead of broadcasting them (overrides the config file)
        #[arg(
            long,
            env = "PYRE_DRY_RUN",
            value_parser = parse_bool_env,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_value = "false",
            default_missing_value = "true"
        )]
        dry_run: bool,
    },

    /// Validate configuration and verify the account, then exit
    Check {
        /// Path to the JSON config file
        #[arg(long, env = "PYRE_CONFIG", default_value = "config.json")]
        config: PathBuf,
    },

    /// Print the post that would be published now
    Preview {
        /// Path to the JSON config file (defaults are used if it is missing)
        #[arg(long, env = "PYRE_CONFIG", default_value = "config.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "pyre=info,pyre_broadcast=info,pyre_steem=info,pyre_scheduler=info".to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, dry_run } => daemon::run(&config, dry_run).await,
        Commands::Check { config } => daemon::check(&config).await,
        Commands::Preview { config } => daemon::preview(&config),
    }
}
