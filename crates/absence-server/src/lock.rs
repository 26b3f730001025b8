//! Distributed schedule lock.
//!
//! Several daemon instances may run the same periodic jobs. Before a job
//! body runs, its instance must win a [`ScheduleLockRecord`] in a shared
//! [`LockStore`]; instances that lose skip the tick without waiting.
//!
//! A record carries an expiry (`lock_at_most_for`), so a holder that dies
//! without releasing blocks the job only until the expiry passes. After a
//! run the record is kept until `lock_at_least_for` has elapsed since
//! acquisition: instances wake for the same tick a few milliseconds apart,
//! and a fast job must not be repeated by the late ones.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt as _;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::jobs::ReminderJob;

/// Default upper bound on how long a lock is held.
pub const DEFAULT_LOCK_AT_MOST_FOR: Duration = Duration::from_secs(10 * 60);

/// Default minimum hold after acquisition. Must stay below the shortest job
/// period, or that job skips ticks.
pub const DEFAULT_LOCK_AT_LEAST_FOR: Duration = Duration::from_secs(30);

/// One lock row in shared storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleLockRecord {
    pub lock_name: String,
    /// Instance id of the owner.
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ScheduleLockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared storage of lock records.
///
/// Implementations must make [`try_acquire`](Self::try_acquire) atomic across
/// every process sharing the store. Calls are blocking.
pub trait LockStore: Send + Sync + 'static {
    /// Stores `record` if no record with the same name exists or the existing
    /// one expired at or before `record.acquired_at`. Returns whether the
    /// record was stored.
    fn try_acquire(&self, record: &ScheduleLockRecord) -> ServerResult<bool>;

    /// Releases `lock_name` if it is still held by `holder`.
    ///
    /// With `hold_until` the record is kept and its expiry moved to that
    /// instant instead of being removed.
    fn release(
        &self,
        lock_name: &str,
        holder: &str,
        hold_until: Option<DateTime<Utc>>,
    ) -> ServerResult<()>;

    /// All records, expired ones included, ordered by name.
    fn list(&self) -> ServerResult<Vec<ScheduleLockRecord>>;
}

/// Process-local lock store.
///
/// Clones share the same records, so one store can stand in for the shared
/// database between simulated instances.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<Mutex<HashMap<String, ScheduleLockRecord>>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn try_acquire(&self, record: &ScheduleLockRecord) -> ServerResult<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = records.get(&record.lock_name)
            && !existing.is_expired(record.acquired_at)
        {
            return Ok(false);
        }
        records.insert(record.lock_name.clone(), record.clone());
        Ok(true)
    }

    fn release(
        &self,
        lock_name: &str,
        holder: &str,
        hold_until: Option<DateTime<Utc>>,
    ) -> ServerResult<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let owned = records
            .get(lock_name)
            .is_some_and(|record| record.holder == holder);
        if !owned {
            return Ok(());
        }
        match hold_until {
            Some(until) => {
                if let Some(record) = records.get_mut(lock_name) {
                    record.expires_at = until;
                }
            }
            None => {
                records.remove(lock_name);
            }
        }
        Ok(())
    }

    fn list(&self) -> ServerResult<Vec<ScheduleLockRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.lock_name.cmp(&b.lock_name));
        Ok(all)
    }
}

/// Source of the current time for lock bookkeeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Result of one locked tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// The lock was won and the job succeeded.
    Executed,
    /// The lock was won and the job returned an error or panicked.
    Failed,
    /// Another holder owns the lock.
    Skipped,
    /// The lock store could not be consulted; nothing ran.
    Unavailable,
}

/// Lock timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    pub lock_at_most_for: Duration,
    pub lock_at_least_for: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_at_most_for: DEFAULT_LOCK_AT_MOST_FOR,
            lock_at_least_for: DEFAULT_LOCK_AT_LEAST_FOR,
        }
    }
}

/// Factory of lock-guarded tasks for one instance.
#[derive(Clone)]
pub struct ScheduleLock {
    store: Arc<dyn LockStore>,
    holder: Arc<str>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
}

impl ScheduleLock {
    pub fn new(store: Arc<dyn LockStore>, holder: impl Into<String>) -> Self {
        Self {
            store,
            holder: Arc::from(holder.into()),
            clock: Arc::new(SystemClock),
            config: LockConfig::default(),
        }
    }

    /// Builder: use another clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builder: set the lock timing.
    pub fn with_config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn config(&self) -> LockConfig {
        self.config
    }

    /// Wraps `job` so every run first acquires the lock named `lock_name`.
    pub fn with_lock(&self, lock_name: impl Into<String>, job: impl ReminderJob) -> LockedTask {
        LockedTask {
            name: Arc::from(lock_name.into()),
            lock: self.clone(),
            job: Arc::new(job),
        }
    }

    fn delta(duration: Duration) -> TimeDelta {
        TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
    }

    async fn acquire(&self, name: &str) -> ServerResult<Option<ScheduleLockRecord>> {
        let now = self.clock.now();
        let record = ScheduleLockRecord {
            lock_name: name.to_string(),
            holder: self.holder.to_string(),
            acquired_at: now,
            expires_at: now
                .checked_add_signed(Self::delta(self.config.lock_at_most_for))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let store = self.store.clone();
        let candidate = record.clone();
        let won = tokio::task::spawn_blocking(move || store.try_acquire(&candidate))
            .await
            .map_err(|e| ServerError::lock_unavailable(name, e.to_string()))??;

        Ok(won.then_some(record))
    }

    async fn release(&self, record: &ScheduleLockRecord) -> ServerResult<()> {
        let hold_until = record
            .acquired_at
            .checked_add_signed(Self::delta(self.config.lock_at_least_for))
            .filter(|until| *until > self.clock.now());

        let store = self.store.clone();
        let name = record.lock_name.clone();
        let holder = record.holder.clone();
        tokio::task::spawn_blocking(move || store.release(&name, &holder, hold_until))
            .await
            .map_err(|e| ServerError::lock_unavailable(&record.lock_name, e.to_string()))?
    }
}

/// A job bound to a lock name.
#[derive(Clone)]
pub struct LockedTask {
    name: Arc<str>,
    lock: ScheduleLock,
    job: Arc<dyn ReminderJob>,
}

impl LockedTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs one tick: acquire, run the job if the lock was won, release.
    pub async fn run(&self) -> TickOutcome {
        let record = match self.lock.acquire(&self.name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(lock = %self.name, holder = %self.lock.holder, "lock held elsewhere, skipping");
                return TickOutcome::Skipped;
            }
            Err(e) => {
                error!(lock = %self.name, error = %e, "schedule lock unavailable, skipping tick");
                return TickOutcome::Unavailable;
            }
        };

        debug!(lock = %self.name, expires_at = %record.expires_at, "lock acquired");
        let outcome = match AssertUnwindSafe(self.job.run()).catch_unwind().await {
            Ok(Ok(())) => {
                info!(job = %self.name, "job finished");
                TickOutcome::Executed
            }
            Ok(Err(e)) => {
                error!(job = %self.name, error = %e, "job failed");
                TickOutcome::Failed
            }
            Err(panic) => {
                error!(job = %self.name, panic = panic_message(&*panic), "job panicked");
                TickOutcome::Failed
            }
        };

        if let Err(e) = self.lock.release(&record).await {
            warn!(lock = %self.name, error = %e, "failed to release lock, it expires at {}", record.expires_at);
        }
        outcome
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Instance identity used as lock holder when none is configured:
/// `hostname-pid-uuid`.
pub fn default_instance_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}-{}-{}", host, std::process::id(), uuid::Uuid::new_v4())
}
