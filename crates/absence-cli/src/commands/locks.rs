//! Lock commands.

use absence_server::{LockStore, ScheduleLockRecord, SqliteLockStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::error::ClientResult;

/// A lock record as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockView {
    pub lock_name: String,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether the record still excludes other instances.
    pub held: bool,
}

impl LockView {
    pub fn new(record: &ScheduleLockRecord, now: DateTime<Utc>) -> Self {
        Self {
            lock_name: record.lock_name.clone(),
            holder: record.holder.clone(),
            acquired_at: record.acquired_at,
            expires_at: record.expires_at,
            held: !record.is_expired(now),
        }
    }

    pub fn line(&self) -> String {
        format!(
            "{:<48} {:<8} {:<40} until {}",
            self.lock_name,
            if self.held { "held" } else { "expired" },
            self.holder,
            self.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Reads lock records from the shared database; a missing database has none.
pub fn read(config: &AppConfig, now: DateTime<Utc>) -> ClientResult<Vec<LockView>> {
    let path = config.storage.database_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let records = SqliteLockStore::open(&path)?.list()?;
    Ok(records.iter().map(|r| LockView::new(r, now)).collect())
}

/// List lock records.
pub fn list(config: &AppConfig, json: bool) -> ClientResult<()> {
    let locks = read(config, Utc::now())?;
    if json {
        println!("{}", to_json(&locks)?);
    } else if locks.is_empty() {
        println!("No schedule locks recorded.");
    } else {
        for lock in &locks {
            println!("{}", lock.line());
        }
    }
    Ok(())
}

pub(crate) fn to_json(value: &impl Serialize) -> ClientResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        crate::error::ClientError::Config(format!("failed to serialize output: {}", e))
    })
}
