//! Serve command: runs the daemon in the foreground.
//!
//! Orchestrates:
//! - Settings file and shared SQLite database
//! - Signal handler (SIGTERM/SIGINT)
//! - Calendar provider from config
//! - Reminder scheduler and calendar endpoints

use std::path::Path;
use std::sync::Arc;

use absence_calendar::{CalendarApi, FileCredentialStore};
use absence_server::{Daemon, DaemonServices, SignalHandler, SqliteFlowStore, SqliteLockStore};
use tracing::info;

use crate::config::AppConfig;
use crate::error::ClientResult;

/// Runs until SIGTERM or SIGINT.
pub async fn run(config: &AppConfig) -> ClientResult<()> {
    let server_config = config.server_config()?;
    let settings_path = config.storage.settings_path();
    let database_path = config.storage.database_path();
    ensure_parent(&database_path)?;

    let services = DaemonServices {
        store: Arc::new(FileCredentialStore::new(&settings_path)),
        flows: Arc::new(SqliteFlowStore::open(&database_path)?),
        locks: Arc::new(SqliteLockStore::open(&database_path)?),
        api: build_api(config)?,
    };
    info!(
        settings = %settings_path.display(),
        database = %database_path.display(),
        provider = services.api.name(),
        "storage ready"
    );

    let signals = SignalHandler::new();
    signals.spawn_listener();

    let daemon = Daemon::new(server_config, services).start().await?;
    info!(
        addr = %daemon.local_addr()?,
        jobs = ?daemon.scheduler().job_names(),
        "daemon started"
    );

    daemon.serve(signals.shutdown_handle()).await?;
    Ok(())
}

fn ensure_parent(path: &Path) -> ClientResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(feature = "google")]
fn build_api(config: &AppConfig) -> ClientResult<Arc<dyn CalendarApi>> {
    let api = absence_calendar::google::GoogleCalendarApi::new(config.google.to_google_config()?)?;
    Ok(Arc::new(api))
}

#[cfg(not(feature = "google"))]
fn build_api(_config: &AppConfig) -> ClientResult<Arc<dyn CalendarApi>> {
    Err(crate::error::ClientError::Config(
        "absence was built without a calendar provider; enable the `google` feature".into(),
    ))
}
