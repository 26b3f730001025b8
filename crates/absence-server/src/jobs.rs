//! Periodic job bodies.
//!
//! A job is anything implementing [`ReminderJob`]; async closures qualify
//! through the blanket impl. Two concrete jobs ship with the daemon:
//! [`CommandJob`] runs an external notification command and
//! [`CalendarSyncJob`] keeps the calendar credential exercised.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use absence_calendar::{
    CalendarApi, CalendarProbe, ClientIdentity, CredentialStore, SyncGate,
};
use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// A unit of periodic work.
pub trait ReminderJob: Send + Sync + 'static {
    fn run(&self) -> BoxFuture<'_, ServerResult<()>>;
}

impl<F, Fut> ReminderJob for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServerResult<()>> + Send + 'static,
{
    fn run(&self) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(self())
    }
}

/// Runs an external command; a non-zero exit status fails the tick.
#[derive(Debug, Clone)]
pub struct CommandJob {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandJob {
    /// Default time a command may run before it is killed.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Builder: set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn execute(&self) -> ServerResult<()> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);

        debug!(job = %self.name, program = %self.program, "running job command");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                ServerError::job(
                    &self.name,
                    format!("command timed out after {}s", self.timeout.as_secs_f64()),
                )
            })??;

        if output.status.success() {
            debug!(
                job = %self.name,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                "job command finished"
            );
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ServerError::job(
            &self.name,
            format!("command exited with {}: {}", output.status, stderr.trim()),
        ))
    }
}

impl ReminderJob for CommandJob {
    fn run(&self) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(self.execute())
    }
}

/// Name of the built-in calendar sync job.
pub const CALENDAR_SYNC_JOB: &str = "CalendarSync";

/// Verifies the stored credential against the provider.
///
/// A no-op while the gate is closed. Otherwise trades the refresh token for
/// an access token and probes the configured calendar.
pub struct CalendarSyncJob {
    gate: Arc<SyncGate>,
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn CalendarApi>,
}

impl CalendarSyncJob {
    pub fn new(
        gate: Arc<SyncGate>,
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn CalendarApi>,
    ) -> Self {
        Self { gate, store, api }
    }

    async fn sync(&self) -> ServerResult<()> {
        let gate = self.gate.clone();
        let store = self.store.clone();
        let settings = tokio::task::spawn_blocking(move || {
            gate.is_sync_active().then(|| store.get()).transpose()
        })
        .await
        .map_err(|e| ServerError::job(CALENDAR_SYNC_JOB, e.to_string()))??;
        let Some(settings) = settings else {
            debug!("calendar sync inactive, nothing to do");
            return Ok(());
        };

        let Some(refresh_token) = settings.credentials.refresh_token() else {
            return Ok(());
        };
        let client = ClientIdentity {
            client_id: &settings.credentials.client_id,
            client_secret: &settings.credentials.client_secret,
        };

        let grant = self.api.refresh_access_token(client, refresh_token).await?;

        match self
            .api
            .probe_calendar(&settings.calendar_id, &grant.access_token)
            .await?
        {
            CalendarProbe::Reachable => {
                info!(calendar_id = %settings.calendar_id, "calendar sync check passed");
            }
            CalendarProbe::Rejected(status) => {
                return Err(ServerError::job(
                    CALENDAR_SYNC_JOB,
                    format!("calendar {} answered {}", settings.calendar_id, status),
                ));
            }
        }

        if let Some(rotated) = grant.refresh_token
            && Some(rotated.as_str()) != settings.credentials.refresh_token()
        {
            warn!("provider rotated the refresh token, storing the new one");
            let gate = self.gate.clone();
            let store = self.store.clone();
            tokio::task::spawn_blocking(move || {
                let mut updated = store.get()?;
                updated.credentials.refresh_token = Some(rotated);
                store.save(&updated)?;
                gate.reevaluate();
                Ok::<_, ServerError>(())
            })
            .await
            .map_err(|e| ServerError::job(CALENDAR_SYNC_JOB, e.to_string()))??;
        }

        Ok(())
    }
}

impl ReminderJob for CalendarSyncJob {
    fn run(&self) -> BoxFuture<'_, ServerResult<()>> {
        Box::pin(self.sync())
    }
}
