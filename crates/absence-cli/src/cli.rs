//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// absence - calendar integration daemon and tools
#[derive(Debug, Parser)]
#[command(name = "absence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ABSENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon in the foreground
    Serve {
        /// Override the configured log format (pretty, compact, json)
        #[arg(long)]
        log_format: Option<String>,
    },

    /// Show calendar sync status and lock holders
    Status,

    /// Calendar sync settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Schedule lock inspection
    Locks {
        #[command(subcommand)]
        action: LocksAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Provider choices for `settings set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    None,
    Google,
}

/// Settings actions.
#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Print the stored settings with secrets redacted
    Show,

    /// Update stored settings
    Set {
        /// Calendar provider
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,

        /// OAuth client ID (supports env:: and pass:: references)
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth client secret (supports env:: and pass:: references)
        #[arg(long)]
        client_secret: Option<String>,

        /// Read client ID and secret from a Google Cloud Console JSON file
        #[arg(long, conflicts_with_all = ["client_id", "client_secret"])]
        client_secret_json: Option<PathBuf>,

        /// Calendar to synchronize into
        #[arg(long)]
        calendar_id: Option<String>,

        /// Forget the stored refresh token, disabling sync
        #[arg(long)]
        clear_refresh_token: bool,
    },
}

/// Lock actions.
#[derive(Debug, Subcommand)]
pub enum LocksAction {
    /// List lock records in the shared database
    List,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
