//! Configuration commands.

use std::path::Path;

use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &AppConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &AppConfig) -> ClientResult<()> {
    config.validate()?;
    let server = config.server_config()?;
    for job in &server.jobs {
        println!("job {:<48} {}", job.name, job.cron);
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file and storage paths.
pub fn path(config: &AppConfig, path: &Path) -> ClientResult<()> {
    println!("config:   {}", path.display());
    println!("settings: {}", config.storage.settings_path().display());
    println!("database: {}", config.storage.database_path().display());
    Ok(())
}
