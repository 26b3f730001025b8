//! Whether calendar synchronization is currently permitted.
//!
//! The gate is a pure function of the stored settings. Jobs ask it before
//! any provider I/O so that missing or incomplete credentials turn the job
//! into a no-op instead of a failure.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ProviderResult;
use crate::settings::{ProviderKind, SyncSettings};
use crate::store::CredentialStore;

/// Snapshot of the sync gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub active: bool,
    pub provider: ProviderKind,
    pub calendar_id: String,
    pub has_refresh_token: bool,
}

impl SyncStatus {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        let has_refresh_token = settings.is_enabled();
        Self {
            active: has_refresh_token && !settings.calendar_id.trim().is_empty(),
            provider: settings.provider,
            calendar_id: settings.calendar_id.clone(),
            has_refresh_token,
        }
    }

    fn inactive() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

pub struct SyncGate {
    store: Arc<dyn CredentialStore>,
    status_tx: watch::Sender<SyncStatus>,
}

impl SyncGate {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let initial = match store.get() {
            Ok(settings) => SyncStatus::from_settings(&settings),
            Err(e) => {
                warn!(error = %e, "failed to read calendar settings, sync inactive");
                SyncStatus::inactive()
            }
        };
        let (status_tx, _) = watch::channel(initial);
        Self { store, status_tx }
    }

    /// True iff a refresh token is stored and a calendar id is configured.
    ///
    /// Reads the store on every call; a read failure counts as inactive.
    pub fn is_sync_active(&self) -> bool {
        match self.status() {
            Ok(status) => status.active,
            Err(e) => {
                warn!(error = %e, "failed to read calendar settings, treating sync as inactive");
                false
            }
        }
    }

    pub fn status(&self) -> ProviderResult<SyncStatus> {
        Ok(SyncStatus::from_settings(&self.store.get()?))
    }

    /// Re-reads the settings and publishes the result to subscribers.
    pub fn reevaluate(&self) -> SyncStatus {
        let status = match self.status() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "failed to re-evaluate calendar sync settings");
                SyncStatus::inactive()
            }
        };

        let previous = self.status_tx.borrow().active;
        match (previous, status.active) {
            (false, true) => info!(
                provider = %status.provider,
                calendar_id = %status.calendar_id,
                "calendar sync activated"
            ),
            (true, false) => warn!(
                has_refresh_token = status.has_refresh_token,
                "calendar sync deactivated"
            ),
            _ => debug!(active = status.active, "calendar sync state unchanged"),
        }

        self.status_tx.send_replace(status.clone());
        status
    }

    /// Receiver that observes every re-evaluation.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProviderCredentials;
    use crate::store::{FileCredentialStore, MemoryCredentialStore};

    fn settings(refresh_token: Option<&str>, calendar_id: &str) -> SyncSettings {
        SyncSettings {
            provider: ProviderKind::Google,
            credentials: ProviderCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
                refresh_token: refresh_token.map(String::from),
            },
            calendar_id: calendar_id.into(),
        }
    }

    #[test]
    fn active_needs_token_and_calendar() {
        let cases = [
            (None, "cal", false),
            (Some(""), "cal", false),
            (Some("token"), "", false),
            (Some("token"), "   ", false),
            (Some("token"), "cal", true),
        ];
        for (token, calendar, expected) in cases {
            let store = Arc::new(MemoryCredentialStore::new(settings(token, calendar)));
            let gate = SyncGate::new(store);
            assert_eq!(gate.is_sync_active(), expected, "{token:?} / {calendar:?}");
        }
    }

    #[test]
    fn reads_store_on_every_call() {
        let store = Arc::new(MemoryCredentialStore::new(settings(None, "cal")));
        let gate = SyncGate::new(store.clone());
        assert!(!gate.is_sync_active());

        store.save(&settings(Some("token"), "cal")).unwrap();
        assert!(gate.is_sync_active());
    }

    #[test]
    fn observes_settings_file_written_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar-settings.json");
        let gate = SyncGate::new(Arc::new(FileCredentialStore::new(&path)));
        assert!(!gate.is_sync_active());

        FileCredentialStore::new(&path)
            .save(&settings(Some("token"), "cal"))
            .unwrap();
        assert!(gate.is_sync_active());
        assert!(gate.reevaluate().active);
    }

    #[test]
    fn reevaluate_publishes_to_subscribers() {
        let store = Arc::new(MemoryCredentialStore::new(settings(None, "cal")));
        let gate = SyncGate::new(store.clone());
        let mut rx = gate.subscribe();
        assert!(!rx.borrow().active);

        store.save(&settings(Some("token"), "cal")).unwrap();
        let status = gate.reevaluate();

        assert!(status.active);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().active);
    }
}
