//! Server error types.

use std::io;

use absence_calendar::ProviderError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (listener, process spawn, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Shared lock or flow storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The lock store could not be consulted; the tick is skipped.
    #[error("Schedule lock {name} unavailable: {message}")]
    LockUnavailable { name: String, message: String },

    /// Invalid cron expression in a job definition.
    #[error("Invalid schedule for job {job}: {source}")]
    Cron {
        job: String,
        #[source]
        source: JobSchedulerError,
    },

    /// The job timer could not be created, started or fed.
    #[error("Job timer error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    /// A job body reported failure.
    #[error("Job {job} failed: {message}")]
    Job { job: String, message: String },

    /// Calendar provider call failed.
    #[error("Calendar provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unknown job name passed to the scheduler.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// The scheduler is no longer running.
    #[error("Scheduler stopped")]
    SchedulerStopped,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a lock-unavailable error.
    pub fn lock_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LockUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a job failure.
    pub fn job(job: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job: job.into(),
            message: message.into(),
        }
    }
}
