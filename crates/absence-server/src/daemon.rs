//! Daemon assembly.
//!
//! Wires the stores and the provider into the sync gate, the authorization
//! controller, the locked scheduler and the HTTP endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use absence_calendar::{
    AuthorizationFlowController, CalendarApi, CredentialStore, FlowStateStore, SyncGate,
};
use tracing::{info, warn};

use crate::config::{JobKind, ServerConfig};
use crate::error::ServerResult;
use crate::http::{CalendarEndpoints, HttpServer};
use crate::jobs::{CalendarSyncJob, CommandJob};
use crate::lock::{LockStore, ScheduleLock, default_instance_id};
use crate::scheduler::{ReminderScheduler, SchedulerHandle};
use crate::signals::ShutdownHandle;

/// Storage and provider backends used by the daemon.
#[derive(Clone)]
pub struct DaemonServices {
    pub store: Arc<dyn CredentialStore>,
    pub flows: Arc<dyn FlowStateStore>,
    pub locks: Arc<dyn LockStore>,
    pub api: Arc<dyn CalendarApi>,
}

/// A configured, not yet started daemon.
pub struct Daemon {
    config: ServerConfig,
    services: DaemonServices,
}

impl Daemon {
    pub fn new(config: ServerConfig, services: DaemonServices) -> Self {
        Self { config, services }
    }

    /// Registers every configured job behind the schedule lock.
    fn build_scheduler(&self, gate: &Arc<SyncGate>) -> ServerResult<ReminderScheduler> {
        let holder = self
            .config
            .instance_id
            .clone()
            .unwrap_or_else(default_instance_id);
        let lock = ScheduleLock::new(self.services.locks.clone(), holder)
            .with_config(self.config.lock);

        let mut scheduler = ReminderScheduler::new(lock);
        for spec in &self.config.jobs {
            match &spec.kind {
                JobKind::Command {
                    program,
                    args,
                    timeout,
                } => scheduler.register(
                    &spec.name,
                    &spec.cron,
                    CommandJob::new(&spec.name, program, args.clone()).with_timeout(*timeout),
                )?,
                JobKind::CalendarSync => scheduler.register(
                    &spec.name,
                    &spec.cron,
                    CalendarSyncJob::new(
                        gate.clone(),
                        self.services.store.clone(),
                        self.services.api.clone(),
                    ),
                )?,
            }
        }
        Ok(scheduler)
    }

    /// Starts the scheduler and binds the HTTP listener.
    pub async fn start(self) -> ServerResult<RunningDaemon> {
        let gate = Arc::new(SyncGate::new(self.services.store.clone()));
        let status = gate.reevaluate();
        info!(
            active = status.active,
            provider = %status.provider.as_str(),
            "calendar sync status at startup"
        );

        let controller = Arc::new(AuthorizationFlowController::new(
            self.services.store.clone(),
            self.services.flows.clone(),
            self.services.api.clone(),
            gate.clone(),
        ));

        let scheduler = self.build_scheduler(&gate)?.start().await?;

        let endpoints = CalendarEndpoints::new(self.config.http.clone(), controller, gate.clone())
            .with_scheduler(scheduler.clone());
        let server = match HttpServer::bind(endpoints).await {
            Ok(server) => server,
            Err(e) => {
                scheduler.stop().await;
                return Err(e);
            }
        };

        Ok(RunningDaemon {
            server,
            scheduler,
            gate,
        })
    }
}

/// A started daemon.
pub struct RunningDaemon {
    server: HttpServer,
    scheduler: SchedulerHandle,
    gate: Arc<SyncGate>,
}

impl RunningDaemon {
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        self.server.local_addr()
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn gate(&self) -> &Arc<SyncGate> {
        &self.gate
    }

    /// Serves until `shutdown` triggers, then stops the scheduler.
    pub async fn serve(self, shutdown: ShutdownHandle) -> ServerResult<()> {
        let result = self
            .server
            .run_until_shutdown(async move { shutdown.wait().await })
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "http listener failed");
        }

        info!("shutting down");
        self.scheduler.stop().await;
        info!("daemon stopped");
        result
    }
}
