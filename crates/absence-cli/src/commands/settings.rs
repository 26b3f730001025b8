//! Settings commands.
//!
//! Edits the calendar settings file the daemon reads. The refresh token is
//! only ever written by the authorization handshake; here it can merely be
//! cleared.

use std::path::PathBuf;

use absence_calendar::{
    CredentialStore, FileCredentialStore, ProviderKind, SyncSettings, SyncStatus,
};

use crate::cli::ProviderArg;
use crate::commands::locks::to_json;
use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Requested changes; unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub provider: Option<ProviderArg>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_secret_json: Option<PathBuf>,
    pub calendar_id: Option<String>,
    pub clear_refresh_token: bool,
}

impl SettingsUpdate {
    fn is_empty(&self) -> bool {
        self.provider.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
            && self.client_secret_json.is_none()
            && self.calendar_id.is_none()
            && !self.clear_refresh_token
    }
}

fn store(config: &AppConfig) -> FileCredentialStore {
    FileCredentialStore::new(config.storage.settings_path())
}

/// Print stored settings with secrets redacted.
pub fn show(config: &AppConfig) -> ClientResult<()> {
    let store = store(config);
    let settings = store.get()?;
    println!("# {}", store.path().display());
    println!("{}", to_json(&settings.redacted())?);
    Ok(())
}

/// Apply `update` to the stored settings.
pub fn set(config: &AppConfig, update: SettingsUpdate, json: bool) -> ClientResult<()> {
    if update.is_empty() {
        return Err(ClientError::Config(
            "nothing to change; see `absence settings set --help`".to_string(),
        ));
    }

    let store = store(config);
    let mut settings = store.get()?;
    let notes = apply(&mut settings, update)?;
    store.save(&settings)?;

    let status = SyncStatus::from_settings(&settings);
    if json {
        println!("{}", to_json(&status)?);
    } else {
        for note in notes {
            println!("{}", note);
        }
        println!(
            "Saved {} (sync {})",
            store.path().display(),
            if status.active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

/// Applies `update` and returns notes for the operator.
///
/// Replacing the client id drops the refresh token, which was issued to the
/// previous client.
pub fn apply(settings: &mut SyncSettings, update: SettingsUpdate) -> ClientResult<Vec<String>> {
    let mut notes = Vec::new();

    if let Some(provider) = update.provider {
        settings.provider = match provider {
            ProviderArg::None => ProviderKind::None,
            ProviderArg::Google => ProviderKind::Google,
        };
    }

    let mut client_id = update.client_id.as_deref().map(secret::resolve).transpose()?;
    let mut client_secret = update
        .client_secret
        .as_deref()
        .map(secret::resolve)
        .transpose()?;
    if let Some(path) = &update.client_secret_json {
        let credentials = read_client_secret_file(path)?;
        client_id = Some(credentials.0);
        client_secret = Some(credentials.1);
    }

    if let Some(id) = client_id {
        let id = id.trim().to_string();
        if id != settings.credentials.client_id && settings.credentials.refresh_token.is_some() {
            settings.credentials.refresh_token = None;
            notes.push("Client id changed: stored refresh token dropped, authorize again.".into());
        }
        settings.credentials.client_id = id;
    }
    if let Some(secret) = client_secret {
        settings.credentials.client_secret = secret.trim().to_string();
    }
    if let Some(calendar_id) = update.calendar_id {
        settings.calendar_id = calendar_id.trim().to_string();
    }
    if update.clear_refresh_token && settings.credentials.refresh_token.take().is_some() {
        notes.push("Refresh token cleared.".into());
    }

    Ok(notes)
}

#[cfg(feature = "google")]
fn read_client_secret_file(path: &std::path::Path) -> ClientResult<(String, String)> {
    let credentials = absence_calendar::google::credentials_from_file(path)?;
    Ok((credentials.client_id, credentials.client_secret))
}

#[cfg(not(feature = "google"))]
fn read_client_secret_file(_path: &std::path::Path) -> ClientResult<(String, String)> {
    Err(ClientError::Config(
        "client secret files need the `google` feature".to_string(),
    ))
}
