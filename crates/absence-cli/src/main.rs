//! absence CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use absence_cli::cli::{Cli, Command, ConfigAction, LocksAction, SettingsAction};
use absence_cli::commands;
use absence_cli::commands::settings::SettingsUpdate;
use absence_cli::config::AppConfig;
use absence_cli::error::ClientResult;
use absence_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli, config: &AppConfig) -> ClientResult<()> {
    let tracing = match &cli.command {
        Command::Serve { log_format } => {
            let mut tracing = config.logging.tracing_config()?;
            if let Some(format) = log_format {
                tracing = tracing.with_format(format.parse()?);
            }
            if cli.debug {
                tracing = tracing.with_level(Level::DEBUG);
            }
            tracing
        }
        _ if cli.debug => TracingConfig::cli_debug(),
        _ => TracingConfig::default(),
    };
    init_tracing(tracing)?;
    Ok(())
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&cli, &config)?;
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    match cli.command {
        Command::Serve { .. } => commands::serve::run(&config).await,
        Command::Status => commands::status::run(&config, cli.json),
        Command::Settings { action } => match action {
            SettingsAction::Show => commands::settings::show(&config),
            SettingsAction::Set {
                provider,
                client_id,
                client_secret,
                client_secret_json,
                calendar_id,
                clear_refresh_token,
            } => commands::settings::set(
                &config,
                SettingsUpdate {
                    provider,
                    client_id,
                    client_secret,
                    client_secret_json,
                    calendar_id,
                    clear_refresh_token,
                },
                cli.json,
            ),
        },
        Command::Locks { action } => match action {
            LocksAction::List => commands::locks::list(&config, cli.json),
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
