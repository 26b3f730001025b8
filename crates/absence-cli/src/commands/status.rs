//! Status command: local view of the sync gate and the shared locks.

use absence_calendar::{CredentialStore, FileCredentialStore, SyncStatus};
use chrono::Utc;
use serde::Serialize;

use crate::commands::locks::{self, LockView};
use crate::config::AppConfig;
use crate::error::ClientResult;

#[derive(Debug, Serialize)]
struct StatusView {
    sync: SyncStatus,
    locks: Vec<LockView>,
}

pub fn run(config: &AppConfig, json: bool) -> ClientResult<()> {
    let store = FileCredentialStore::new(config.storage.settings_path());
    let view = StatusView {
        sync: SyncStatus::from_settings(&store.get()?),
        locks: locks::read(config, Utc::now())?,
    };

    if json {
        println!("{}", locks::to_json(&view)?);
        return Ok(());
    }

    println!("{}", describe(&view.sync));
    if !view.locks.is_empty() {
        println!();
        for lock in &view.locks {
            println!("{}", lock.line());
        }
    }
    Ok(())
}

fn describe(status: &SyncStatus) -> String {
    if status.active {
        format!(
            "Calendar sync active ({}, calendar {})",
            status.provider, status.calendar_id
        )
    } else if !status.has_refresh_token {
        "Calendar sync inactive: not authorized yet".to_string()
    } else {
        "Calendar sync inactive: no calendar configured".to_string()
    }
}
