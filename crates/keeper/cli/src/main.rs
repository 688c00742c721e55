//! Keeper CLI
//!
//! Operator tooling for Keeper:
//! - `keeper config` prints the effective configuration
//! - `keeper simulate` drives a funded workflow through several cooldown
//!   periods against simulated collaborators and prints the outcome

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod simulate;

use config::KeeperConfig;
use simulate::SimulateArgs;

/// Keeper CLI
#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Keeper - escrow-funded, caller-incentivized workflow scheduling", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KEEPER_CONFIG")]
    config: Option<String>,

    /// Log level; overrides the configured one
    #[arg(long, env = "KEEPER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "KEEPER_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config,

    /// Run a scripted simulation and print receipts and events as JSON
    Simulate(SimulateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = KeeperConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.json || config.logging.json,
    );

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate(args) => {
            let report = simulate::run(config.keeper, &args)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
