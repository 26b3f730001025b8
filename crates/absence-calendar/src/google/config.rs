//! Google Calendar integration configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};
use crate::settings::ProviderCredentials;

/// Google OAuth and API endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Endpoints and HTTP behaviour of the Google integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub auth_url: String,
    pub token_url: String,
    /// Base URL of the Calendar API v3.
    pub api_base: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub fn new() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("absence/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Points token and API calls at another host, e.g. a local stub.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("api_base", &self.api_base),
        ] {
            url::Url::parse(value).map_err(|e| format!("invalid {}: {}", name, e))?;
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Structure of the client secret JSON downloaded from the Google Cloud
/// Console.
///
/// Supports the `installed` and `web` sections as well as a flat document
/// with `client_id` and `client_secret` at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretSection>,
    web: Option<ClientSecretSection>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretSection {
    client_id: String,
    client_secret: String,
}

/// Reads client id and secret from a Google client secret file.
pub fn credentials_from_file(path: impl AsRef<Path>) -> ProviderResult<ProviderCredentials> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        ProviderError::configuration(format!("failed to read client secret file: {}", e))
            .with_source(e)
    })?;
    credentials_from_json(&content)
}

/// Parses client id and secret from a Google client secret document.
pub fn credentials_from_json(json: &str) -> ProviderResult<ProviderCredentials> {
    let file: ClientSecretFile = serde_json::from_str(json).map_err(|e| {
        ProviderError::configuration(format!("failed to parse client secret JSON: {}", e))
    })?;

    let credentials = if let Some(section) = file.web.or(file.installed) {
        ProviderCredentials::new(section.client_id, section.client_secret)
    } else if let (Some(id), Some(secret)) = (file.client_id, file.client_secret) {
        ProviderCredentials::new(id, secret)
    } else {
        return Err(ProviderError::configuration(
            "client secret file must contain a 'web'/'installed' section or root 'client_id'/'client_secret'",
        ));
    };

    validate_client_id(&credentials.client_id).map_err(ProviderError::configuration)?;
    if credentials.client_secret.is_empty() {
        return Err(ProviderError::configuration("client_secret is required"));
    }
    Ok(credentials)
}

/// Checks the shape of a Google OAuth client id.
pub fn validate_client_id(client_id: &str) -> Result<(), &'static str> {
    if client_id.is_empty() {
        return Err("client_id is required");
    }
    if !client_id.ends_with(".apps.googleusercontent.com") {
        return Err("client_id should end with .apps.googleusercontent.com");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_google() {
        let config = GoogleConfig::default();
        assert_eq!(config.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.api_base, CALENDAR_API_BASE);
        assert!(config.user_agent.starts_with("absence/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_urls_and_zero_timeout() {
        let bad_url = GoogleConfig::new().with_endpoints("nope", GOOGLE_TOKEN_URL, CALENDAR_API_BASE);
        assert!(bad_url.validate().unwrap_err().contains("auth_url"));

        let zero = GoogleConfig::new().with_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn web_client_secret() {
        let json = r#"{
            "web": {
                "client_id": "web-id.apps.googleusercontent.com",
                "client_secret": "web-secret",
                "project_id": "absence",
                "redirect_uris": ["https://absence.example.com/integration/calendar/authorize"]
            }
        }"#;

        let creds = credentials_from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "web-secret");
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn installed_client_secret() {
        let json = r#"{"installed": {"client_id": "i.apps.googleusercontent.com", "client_secret": "s"}}"#;
        assert_eq!(
            credentials_from_json(json).unwrap().client_id,
            "i.apps.googleusercontent.com"
        );
    }

    #[test]
    fn flat_client_secret() {
        let json = r#"{
            "client_id": "flat-id.apps.googleusercontent.com",
            "client_secret": "flat-secret",
            "refresh_token": "ignored"
        }"#;

        let creds = credentials_from_json(json).unwrap();
        assert_eq!(creds.client_secret, "flat-secret");
        assert!(creds.refresh_token.is_none());
    }

    #[test]
    fn client_secret_rejections() {
        assert!(credentials_from_json("not json").is_err());
        assert!(credentials_from_json(r#"{"other": {}}"#).is_err());

        let bad_id = r#"{"client_id": "bad-id", "client_secret": "s"}"#;
        let err = credentials_from_json(bad_id).unwrap_err();
        assert!(err.message().contains("googleusercontent"));

        let no_secret = r#"{"client_id": "x.apps.googleusercontent.com", "client_secret": ""}"#;
        assert!(credentials_from_json(no_secret).is_err());
    }

    #[test]
    fn client_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret.json");
        std::fs::write(
            &path,
            r#"{"web": {"client_id": "f.apps.googleusercontent.com", "client_secret": "s"}}"#,
        )
        .unwrap();

        assert_eq!(credentials_from_file(&path).unwrap().client_secret, "s");
        assert!(credentials_from_file(dir.path().join("missing.json")).is_err());
    }
}
