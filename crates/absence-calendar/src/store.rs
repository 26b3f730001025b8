//! Persistence of [`SyncSettings`].
//!
//! The store is a plain get/save contract with last-writer-wins semantics.
//! [`FileCredentialStore`] keeps the settings as a JSON document next to the
//! daemon's other state; [`MemoryCredentialStore`] backs tests and ephemeral
//! setups.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::settings::SyncSettings;

/// Storage contract for calendar sync settings.
pub trait CredentialStore: Send + Sync {
    /// Returns the current settings. A store that was never written returns
    /// the defaults.
    fn get(&self) -> ProviderResult<SyncSettings>;

    /// Overwrites the stored settings.
    fn save(&self, settings: &SyncSettings) -> ProviderResult<()>;
}

/// Settings stored as a JSON file.
///
/// Every `get` reads the file, so edits made by `absence settings set` or
/// by another daemon instance are visible on the next call. Writes go to a
/// temporary file that is renamed over the target, so readers never observe
/// a half-written document.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ProviderResult<SyncSettings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no settings file, using defaults");
            return Ok(SyncSettings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::storage(format!("failed to read settings file: {}", e)).with_source(e)
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ProviderError::storage(format!("failed to parse settings file: {}", e)).with_source(e)
        })
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> ProviderResult<SyncSettings> {
        self.load()
    }

    fn save(&self, settings: &SyncSettings) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::storage(format!("failed to create settings directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| ProviderError::internal(format!("failed to serialize settings: {}", e)))?;

        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::storage(format!("failed to write settings file: {}", e))
        })?;

        // The file holds client secret and refresh token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::storage(format!("failed to rename settings file: {}", e))
        })?;

        info!(path = %self.path.display(), "saved calendar sync settings");
        Ok(())
    }
}

/// In-memory settings store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    settings: RwLock<SyncSettings>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> ProviderResult<SyncSettings> {
        Ok(self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, settings: &SyncSettings) -> ProviderResult<()> {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ProviderCredentials, ProviderKind};

    fn sample() -> SyncSettings {
        SyncSettings {
            provider: ProviderKind::Google,
            credentials: ProviderCredentials {
                client_id: "client.apps.googleusercontent.com".into(),
                client_secret: "secret".into(),
                refresh_token: Some("1//refresh".into()),
            },
            calendar_id: "absences@group.calendar.google.com".into(),
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("settings.json"));
        assert_eq!(store.get().unwrap(), SyncSettings::default());
    }

    #[test]
    fn save_then_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        FileCredentialStore::new(&path).save(&sample()).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get().unwrap(), sample());
    }

    #[cfg(unix)]
    #[test]
    fn settings_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        FileCredentialStore::new(&path).save(&sample()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FileCredentialStore::new(&path).get().unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::Storage);
    }

    #[test]
    fn sees_writes_from_another_store_on_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let daemon = FileCredentialStore::new(&path);
        assert_eq!(daemon.get().unwrap(), SyncSettings::default());

        let cli = FileCredentialStore::new(&path);
        let mut edited = SyncSettings::default();
        edited.credentials.client_id = "id.apps.googleusercontent.com".into();
        cli.save(&edited).unwrap();
        assert_eq!(
            daemon.get().unwrap().credentials.client_id,
            "id.apps.googleusercontent.com"
        );

        cli.save(&sample()).unwrap();
        assert_eq!(daemon.get().unwrap(), sample());
    }

    #[test]
    fn last_writer_wins() {
        let store = MemoryCredentialStore::default();
        let mut first = sample();
        first.calendar_id = "first".into();
        let mut second = sample();
        second.calendar_id = "second".into();

        store.save(&first).unwrap();
        store.save(&second).unwrap();

        assert_eq!(store.get().unwrap().calendar_id, "second");
        assert_eq!(store.save_count(), 2);
    }
}
