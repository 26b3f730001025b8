//! SQLite-backed shared storage.
//!
//! Every daemon instance opens the same database file. SQLite serializes
//! writers, so the conditional upsert in [`SqliteLockStore::try_acquire`]
//! and the `DELETE ... RETURNING` in [`SqliteFlowStore::take`] are atomic
//! across processes.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use absence_calendar::{AuthorizationState, FlowStateStore, ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::ServerResult;
use crate::lock::{LockStore, ScheduleLockRecord};

/// How long a writer waits for another process's transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schedule_lock (
    lock_name   TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS authorization_flow (
    slot       INTEGER PRIMARY KEY CHECK (slot = 1),
    state      TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    payload    TEXT NOT NULL
);
";

fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "opened shared database");
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Lock records in a shared SQLite database.
#[derive(Debug)]
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
}

impl SqliteLockStore {
    /// Opens (and creates if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening schedule lock database");
        Ok(Self {
            conn: Mutex::new(open(path)?),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LockStore for SqliteLockStore {
    fn try_acquire(&self, record: &ScheduleLockRecord) -> ServerResult<bool> {
        let changed = self.conn().execute(
            "INSERT INTO schedule_lock (lock_name, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(lock_name) DO UPDATE SET
                 holder = excluded.holder,
                 acquired_at = excluded.acquired_at,
                 expires_at = excluded.expires_at
             WHERE schedule_lock.expires_at <= excluded.acquired_at",
            params![
                record.lock_name,
                record.holder,
                to_millis(record.acquired_at),
                to_millis(record.expires_at),
            ],
        )?;
        Ok(changed == 1)
    }

    fn release(
        &self,
        lock_name: &str,
        holder: &str,
        hold_until: Option<DateTime<Utc>>,
    ) -> ServerResult<()> {
        let conn = self.conn();
        let changed = match hold_until {
            Some(until) => conn.execute(
                "UPDATE schedule_lock SET expires_at = ?3 WHERE lock_name = ?1 AND holder = ?2",
                params![lock_name, holder, to_millis(until)],
            )?,
            None => conn.execute(
                "DELETE FROM schedule_lock WHERE lock_name = ?1 AND holder = ?2",
                params![lock_name, holder],
            )?,
        };
        if changed == 0 {
            warn!(lock = lock_name, holder, "lock was no longer held at release");
        }
        Ok(())
    }

    fn list(&self) -> ServerResult<Vec<ScheduleLockRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT lock_name, holder, acquired_at, expires_at FROM schedule_lock ORDER BY lock_name",
        )?;
        let records = stmt
            .query_map([], |row| {
                Ok(ScheduleLockRecord {
                    lock_name: row.get(0)?,
                    holder: row.get(1)?,
                    acquired_at: from_millis(row.get(2)?),
                    expires_at: from_millis(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Pending authorization flow in the shared database, so the callback may
/// land on any instance.
#[derive(Debug)]
pub struct SqliteFlowStore {
    conn: Mutex<Connection>,
}

impl SqliteFlowStore {
    pub fn open(path: impl AsRef<Path>) -> ServerResult<Self> {
        Ok(Self {
            conn: Mutex::new(open(path.as_ref())?),
        })
    }
}

fn storage_error(e: rusqlite::Error) -> ProviderError {
    ProviderError::storage(format!("authorization flow storage failed: {}", e)).with_source(e)
}

impl FlowStateStore for SqliteFlowStore {
    fn put(&self, state: &AuthorizationState) -> ProviderResult<()> {
        let payload = serde_json::to_string(state).map_err(|e| {
            ProviderError::internal(format!("failed to serialize authorization state: {}", e))
        })?;
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(
                "INSERT OR REPLACE INTO authorization_flow (slot, state, expires_at, payload)
                 VALUES (1, ?1, ?2, ?3)",
                params![state.state, to_millis(state.expires_at), payload],
            )
            .map_err(storage_error)?;
        Ok(())
    }

    fn take(&self) -> ProviderResult<Option<AuthorizationState>> {
        let payload: Option<String> = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .query_row(
                "DELETE FROM authorization_flow WHERE slot = 1 RETURNING payload",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;

        payload
            .map(|payload| {
                serde_json::from_str(&payload).map_err(|e| {
                    ProviderError::storage(format!("corrupt authorization state: {}", e))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeDelta;

    use super::*;

    fn record(holder: &str, at: DateTime<Utc>, minutes: i64) -> ScheduleLockRecord {
        ScheduleLockRecord {
            lock_name: "WaitingApplicationsReminderNotification".into(),
            holder: holder.into(),
            acquired_at: at,
            expires_at: at + TimeDelta::minutes(minutes),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn exclusive_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let a = SqliteLockStore::open(&path).unwrap();
        let b = SqliteLockStore::open(&path).unwrap();
        let now = at("2026-03-02T07:00:00Z");

        assert!(a.try_acquire(&record("a", now, 10)).unwrap());
        assert!(!b.try_acquire(&record("b", now, 10)).unwrap());

        let held = b.list().unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].holder, "a");
        assert_eq!(held[0].expires_at, at("2026-03-02T07:10:00Z"));
    }

    #[test]
    fn expired_record_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let a = SqliteLockStore::open(&path).unwrap();
        let b = SqliteLockStore::open(&path).unwrap();

        assert!(a.try_acquire(&record("a", at("2026-03-02T07:00:00Z"), 10)).unwrap());
        assert!(!b.try_acquire(&record("b", at("2026-03-02T07:09:59Z"), 10)).unwrap());
        assert!(b.try_acquire(&record("b", at("2026-03-02T07:10:00Z"), 10)).unwrap());
        assert_eq!(a.list().unwrap()[0].holder, "b");
    }

    #[test]
    fn release_only_by_holder() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLockStore::open(dir.path().join("locks.db")).unwrap();
        let now = at("2026-03-02T16:00:00Z");
        assert!(store.try_acquire(&record("a", now, 10)).unwrap());

        store
            .release("WaitingApplicationsReminderNotification", "b", None)
            .unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        let until = now + TimeDelta::seconds(30);
        store
            .release("WaitingApplicationsReminderNotification", "a", Some(until))
            .unwrap();
        assert_eq!(store.list().unwrap()[0].expires_at, until);

        store
            .release("WaitingApplicationsReminderNotification", "a", None)
            .unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    fn flow(state: &str) -> AuthorizationState {
        let now = at("2026-03-02T07:00:00Z");
        AuthorizationState {
            state: state.into(),
            redirect_uri: "https://absence.example.com/integration/calendar/authorize".into(),
            scopes: BTreeSet::from(["https://www.googleapis.com/auth/calendar".to_string()]),
            code_verifier: "verifier".into(),
            created_at: now,
            expires_at: now + TimeDelta::minutes(10),
        }
    }

    #[test]
    fn flow_is_shared_and_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let starter = SqliteFlowStore::open(&path).unwrap();
        let finisher = SqliteFlowStore::open(&path).unwrap();

        starter.put(&flow("first")).unwrap();
        starter.put(&flow("second")).unwrap();

        assert_eq!(finisher.take().unwrap(), Some(flow("second")));
        assert_eq!(finisher.take().unwrap(), None);
        assert_eq!(starter.take().unwrap(), None);
    }
}
