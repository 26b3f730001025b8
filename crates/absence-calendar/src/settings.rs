//! Calendar sync settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which external calendar provider sync talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// No provider configured; sync is a no-op.
    #[default]
    None,
    /// Google Calendar.
    Google,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth client credentials plus the refresh token obtained by the handshake.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Absent until the first successful handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl ProviderCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: None,
        }
    }

    /// Both client id and secret are set.
    pub fn has_client(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(redacted),
            )
            .finish()
    }
}

fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

/// Persisted calendar sync settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub provider: ProviderKind,
    pub credentials: ProviderCredentials,
    /// Calendar the sync writes to (e.g. an `@group.calendar.google.com` id).
    pub calendar_id: String,
}

impl SyncSettings {
    /// Sync is enabled once a refresh token has been stored.
    pub fn is_enabled(&self) -> bool {
        self.credentials.refresh_token().is_some()
    }

    /// Copy suitable for display: secrets replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.credentials.client_secret = redacted(&copy.credentials.client_secret).to_string();
        copy.credentials.refresh_token = copy
            .credentials
            .refresh_token
            .as_deref()
            .map(|token| redacted(token).to_string());
        copy
    }
}
