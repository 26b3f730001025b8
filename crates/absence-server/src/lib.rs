//! Daemon: schedule locks, reminder scheduler, calendar endpoints.
//!
//! This crate provides the absence daemon that handles:
//! - Cluster-wide schedule locks so each periodic job runs once per tick
//! - Cron-driven reminder and calendar sync jobs
//! - The calendar authorization and status HTTP endpoints
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use absence_calendar::FileCredentialStore;
//! use absence_calendar::google::{GoogleCalendarApi, GoogleConfig};
//! use absence_server::{
//!     Daemon, DaemonServices, HttpConfig, JobSpec, ServerConfig, SignalHandler, SqliteFlowStore,
//!     SqliteLockStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = DaemonServices {
//!         store: Arc::new(FileCredentialStore::new("/var/lib/absence/calendar.json")),
//!         flows: Arc::new(SqliteFlowStore::open("/var/lib/absence/shared.db")?),
//!         locks: Arc::new(SqliteLockStore::open("/var/lib/absence/shared.db")?),
//!         api: Arc::new(GoogleCalendarApi::new(GoogleConfig::default())?),
//!     };
//!     let config = ServerConfig::new(HttpConfig::default())
//!         .with_job(JobSpec::calendar_sync("0 0 * * * *"));
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!     let daemon = Daemon::new(config, services).start().await?;
//!     daemon.serve(signals.shutdown_handle()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod daemon;
mod error;
mod http;
mod jobs;
mod lock;
mod scheduler;
mod signals;
mod sqlite;

#[cfg(test)]
mod testing;

pub use config::{AUTHORIZE_PATH, HttpConfig, JobKind, JobSpec, STATUS_PATH, ServerConfig};
pub use daemon::{Daemon, DaemonServices, RunningDaemon};
pub use error::{ServerError, ServerResult};
pub use http::{CalendarEndpoints, HttpServer, StatusReport};
pub use jobs::{CALENDAR_SYNC_JOB, CalendarSyncJob, CommandJob, ReminderJob};
pub use lock::{
    Clock, DEFAULT_LOCK_AT_LEAST_FOR, DEFAULT_LOCK_AT_MOST_FOR, LockConfig, LockStore, LockedTask,
    MemoryLockStore, ScheduleLock, ScheduleLockRecord, SystemClock, TickOutcome,
    default_instance_id,
};
pub use scheduler::{
    JobState, ReminderScheduler, SchedulerHandle, SharedSchedulerState, validate_cron,
};
pub use signals::{ShutdownHandle, SignalHandler};
pub use sqlite::{SqliteFlowStore, SqliteLockStore};
