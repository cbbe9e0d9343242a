use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tradechat_core::models::BanExpiry;

#[derive(Parser)]
#[command(name = "tradechat")]
#[command(about = "Check, gate, and replay Tradechat chat traffic from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to a JSON chat configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the send guards and moderation filter against a message
    Check {
        /// Message text
        text: Vec<String>,
        /// Treat the sender as a subscriber
        #[arg(long)]
        subscriber: bool,
        /// Treat the sender as a moderator
        #[arg(long)]
        moderator: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a ban expiry against the current time
    BanStatus {
        /// Ban expiry: Unix ms timestamp or "permanent"
        #[arg(long, value_name = "MILLIS|permanent")]
        banned_until: Option<BanExpiry>,
        /// Evaluate at this Unix ms timestamp instead of now
        #[arg(long, value_name = "MILLIS")]
        now: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a JSON chat scenario through the reconciler and inbox
    Replay {
        /// Scenario file
        #[arg(value_name = "PATH")]
        scenario: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Write output to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file, then TRADECHAT_* overrides)
    Show,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
