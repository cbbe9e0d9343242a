//! Tradechat CLI - command-line tooling for the chat core
//!
//! Dry-run messages through moderation, evaluate bans, and replay recorded
//! chat scenarios without a live backend.

mod cli;
mod commands;
mod error;
mod scenario;


use clap::Parser;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::commands::ban::run_ban_status;
use crate::commands::check::run_check;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config_show;
use crate::commands::replay::run_replay;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tradechat=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Check {
            text,
            subscriber,
            moderator,
            json,
        } => run_check(&text, subscriber, moderator, json, config_path)?,
        Commands::BanStatus {
            banned_until,
            now,
            json,
        } => run_ban_status(banned_until, now, json)?,
        Commands::Replay { scenario, json } => run_replay(&scenario, json, config_path).await?,
        Commands::Config {
            command: ConfigCommands::Show,
        } => run_config_show(config_path)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
