//! Cron-driven reminder scheduler.
//!
//! Jobs are timed by a [`JobScheduler`]. Every fire runs the job through its
//! [`LockedTask`], so across all instances only one execution happens per
//! tick. Expressions use six fields, `sec min hour day-of-month month
//! day-of-week`, and are evaluated in UTC.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::jobs::ReminderJob;
use crate::lock::{LockedTask, ScheduleLock, TickOutcome};

/// Per-job bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobState {
    pub cron: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<TickOutcome>,
    /// Ticks where this instance ran the job.
    pub executions: u64,
    /// Ticks where the job failed or the lock store was unavailable.
    pub failures: u64,
}

impl JobState {
    fn record(&mut self, outcome: TickOutcome) {
        self.last_run = Some(Utc::now());
        self.last_outcome = Some(outcome);
        match outcome {
            TickOutcome::Executed => self.executions += 1,
            TickOutcome::Failed => {
                self.executions += 1;
                self.failures += 1;
            }
            TickOutcome::Unavailable => self.failures += 1,
            TickOutcome::Skipped => {}
        }
    }
}

/// Job states keyed by job name.
pub type SharedSchedulerState = Arc<RwLock<BTreeMap<String, JobState>>>;

/// Checks that `cron` is an expression the scheduler accepts.
pub fn validate_cron(cron: &str) -> Result<(), JobSchedulerError> {
    Job::new_async(cron, |_id, _scheduler| Box::pin(async {})).map(drop)
}

struct Registration {
    task: LockedTask,
    cron: String,
}

/// Collects jobs and starts their timers.
pub struct ReminderScheduler {
    lock: ScheduleLock,
    jobs: Vec<Registration>,
}

impl ReminderScheduler {
    pub fn new(lock: ScheduleLock) -> Self {
        Self {
            lock,
            jobs: Vec::new(),
        }
    }

    /// Registers `job` under `name` with a cron expression.
    ///
    /// The name doubles as the lock name.
    pub fn register(&mut self, name: &str, cron: &str, job: impl ReminderJob) -> ServerResult<()> {
        validate_cron(cron).map_err(|source| ServerError::Cron {
            job: name.to_string(),
            source,
        })?;
        if self.jobs.iter().any(|j| j.task.name() == name) {
            return Err(ServerError::config(format!("job {} registered twice", name)));
        }

        debug!(job = name, cron, "registered job");
        self.jobs.push(Registration {
            task: self.lock.with_lock(name, job),
            cron: cron.to_string(),
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.task.name()).collect()
    }

    /// Hands every job to a new [`JobScheduler`] and starts it.
    pub async fn start(self) -> ServerResult<SchedulerHandle> {
        let mut timer = JobScheduler::new().await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = Arc::new(RwLock::new(()));
        let state: SharedSchedulerState = Arc::new(RwLock::new(
            self.jobs
                .iter()
                .map(|j| {
                    (
                        j.task.name().to_string(),
                        JobState {
                            cron: j.cron.clone(),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        ));

        let mut tasks = BTreeMap::new();
        for registration in self.jobs {
            let name = registration.task.name().to_string();
            let job = fire_on_schedule(
                &registration,
                state.clone(),
                running.clone(),
                shutdown_rx.clone(),
            )
            .map_err(|source| ServerError::Cron {
                job: name.clone(),
                source,
            })?;
            let id = timer.add(job).await?;

            let next_run = timer.next_tick_for_job(id).await.ok().flatten();
            if let Some(job) = state.write().await.get_mut(&name) {
                job.next_run = next_run;
            }
            debug!(job = %name, next = ?next_run, "job scheduled");
            tasks.insert(name, registration.task);
        }

        timer.start().await?;
        info!(
            jobs = tasks.len(),
            holder = self.lock.holder(),
            "reminder scheduler started"
        );
        Ok(SchedulerHandle {
            tasks: Arc::new(tasks),
            state,
            timer,
            running,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }
}

/// Timer job that runs `registration` behind its lock and records the tick.
fn fire_on_schedule(
    registration: &Registration,
    state: SharedSchedulerState,
    running: Arc<RwLock<()>>,
    shutdown: watch::Receiver<bool>,
) -> Result<Job, JobSchedulerError> {
    let task = registration.task.clone();
    Job::new_async(registration.cron.as_str(), move |id, mut timer| {
        let task = task.clone();
        let state = state.clone();
        let running = running.clone();
        let shutdown = shutdown.clone();
        Box::pin(async move {
            let _running = running.read().await;
            if *shutdown.borrow() {
                debug!(job = task.name(), "scheduler stopping, tick dropped");
                return;
            }

            let outcome = task.run().await;
            let next_run = timer.next_tick_for_job(id).await.ok().flatten();
            if let Some(job) = state.write().await.get_mut(task.name()) {
                job.record(outcome);
                job.next_run = next_run;
            }
        })
    })
}

/// Control of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tasks: Arc<BTreeMap<String, LockedTask>>,
    state: SharedSchedulerState,
    timer: JobScheduler,
    /// Held shared by every tick; `stop` takes it exclusively.
    running: Arc<RwLock<()>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Runs a job immediately, still guarded by its lock.
    pub async fn run_now(&self, name: &str) -> ServerResult<TickOutcome> {
        if *self.shutdown_tx.borrow() {
            return Err(ServerError::SchedulerStopped);
        }
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| ServerError::UnknownJob(name.to_string()))?;

        info!(job = name, "running job on demand");
        let outcome = task.run().await;
        if let Some(job) = self.state.write().await.get_mut(name) {
            job.record(outcome);
        }
        Ok(outcome)
    }

    /// Stops the timer and waits for running ticks to finish.
    pub async fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        let mut timer = self.timer.clone();
        if let Err(e) = timer.shutdown().await {
            warn!(error = %e, "job timer did not shut down cleanly");
        }
        drop(self.running.write().await);
        info!("reminder scheduler stopped");
    }

    /// Snapshot of all job states.
    pub async fn state(&self) -> BTreeMap<String, JobState> {
        self.state.read().await.clone()
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }
}
