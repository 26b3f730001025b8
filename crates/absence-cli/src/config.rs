//! Application configuration.
//!
//! All daemon and CLI settings live in a single `config.toml`, by default
//! `$XDG_CONFIG_HOME/absence/config.toml`. Every section is optional.
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [storage]
//! settings_path = "/var/lib/absence/calendar-settings.json"
//! database_path = "/var/lib/absence/shared.db"
//!
//! [http]
//! bind = "0.0.0.0:8087"
//! public_url = "https://absence.example.com"
//!
//! [lock]
//! at_most_for_secs = 600
//!
//! [scheduler]
//! calendar_sync = "0 */30 * * * *"
//!
//! [[scheduler.jobs]]
//! name = "WaitingApplicationsReminderNotification"
//! command = ["absence-notify", "waiting"]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use absence_core::{TracingConfig, TracingOutputFormat};
use absence_server::{
    DEFAULT_LOCK_AT_LEAST_FOR, DEFAULT_LOCK_AT_MOST_FOR, HttpConfig, JobSpec, LockConfig,
    ServerConfig, validate_cron,
};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{ClientError, ClientResult};

/// Reminder jobs of the absence application and their usual schedules.
pub const KNOWN_JOBS: [(&str, &str); 3] = [
    ("WaitingApplicationsReminderNotification", "0 0 7 * * *"),
    ("UpcomingApplicationsReminderNotification", "0 0 16 * * *"),
    ("UpcomingHolidayReplacementReminderNotification", "0 0 16 * * *"),
];

/// Default cron expression of a known job.
pub fn default_cron(job: &str) -> Option<&'static str> {
    KNOWN_JOBS
        .iter()
        .find(|(name, _)| *name == job)
        .map(|(_, cron)| *cron)
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub http: HttpSettings,
    pub google: GoogleSettings,
    pub lock: LockSettings,
    pub scheduler: SchedulerSettings,
}

/// Daemon log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `trace`, `debug`, `info`, `warn` or `error`. `RUST_LOG` wins.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Tracing setup for the daemon.
    pub fn tracing_config(&self) -> ClientResult<TracingConfig> {
        let level: Level = self
            .level
            .parse()
            .map_err(|_| ClientError::Config(format!("unknown log level '{}'", self.level)))?;
        let format: TracingOutputFormat = self.format.parse()?;
        Ok(TracingConfig::daemon().with_level(level).with_format(format))
    }
}

/// Where settings and shared state are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Calendar settings JSON (client credentials and refresh token).
    pub settings_path: Option<PathBuf>,
    /// SQLite database shared by all instances (locks, pending handshake).
    pub database_path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| AppConfig::default_data_dir().join("calendar-settings.json"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| AppConfig::default_data_dir().join("shared.db"))
    }
}

/// Calendar endpoints listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
    pub public_url: Option<String>,
    pub role_header: String,
    pub allowed_roles: Vec<String>,
    pub status_page: String,
    pub connection_timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let defaults = HttpConfig::default();
        Self {
            bind: defaults.bind.to_string(),
            public_url: None,
            role_header: defaults.role_header,
            allowed_roles: defaults.allowed_roles,
            status_page: defaults.status_page,
            connection_timeout_secs: defaults.connection_timeout.as_secs(),
            max_connections: defaults.max_connections,
        }
    }
}

impl HttpSettings {
    pub fn to_http_config(&self) -> ClientResult<HttpConfig> {
        let bind: SocketAddr = self
            .bind
            .parse()
            .map_err(|e| ClientError::Config(format!("invalid http.bind '{}': {}", self.bind, e)))?;
        if self.allowed_roles.is_empty() {
            return Err(ClientError::Config(
                "http.allowed_roles must name at least one role".to_string(),
            ));
        }
        if self.connection_timeout_secs == 0 {
            return Err(ClientError::Config(
                "http.connection_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let mut config = HttpConfig::default()
            .with_bind(bind)
            .with_roles(self.role_header.clone(), self.allowed_roles.clone())
            .with_status_page(self.status_page.clone())
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs));
        config.max_connections = self.max_connections;
        if let Some(url) = &self.public_url {
            config = config.with_public_url(url.as_str());
        }
        Ok(config)
    }
}

/// Google endpoint overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            auth_url: None,
            token_url: None,
            api_base: None,
            timeout_secs: 30,
        }
    }
}

#[cfg(feature = "google")]
impl GoogleSettings {
    pub fn to_google_config(&self) -> ClientResult<absence_calendar::google::GoogleConfig> {
        use absence_calendar::google::{
            CALENDAR_API_BASE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig,
        };

        let config = GoogleConfig::new()
            .with_endpoints(
                self.auth_url.as_deref().unwrap_or(GOOGLE_AUTH_URL),
                self.token_url.as_deref().unwrap_or(GOOGLE_TOKEN_URL),
                self.api_base.as_deref().unwrap_or(CALENDAR_API_BASE),
            )
            .with_timeout(Duration::from_secs(self.timeout_secs));
        config
            .validate()
            .map_err(|e| ClientError::Config(format!("invalid [google] section: {}", e)))?;
        Ok(config)
    }
}

/// Schedule lock timing and holder identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Holder name written into lock records; `hostname-pid-uuid` if unset.
    pub instance_id: Option<String>,
    pub at_most_for_secs: u64,
    pub at_least_for_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            instance_id: None,
            at_most_for_secs: DEFAULT_LOCK_AT_MOST_FOR.as_secs(),
            at_least_for_secs: DEFAULT_LOCK_AT_LEAST_FOR.as_secs(),
        }
    }
}

impl LockSettings {
    pub fn to_lock_config(&self) -> ClientResult<LockConfig> {
        if self.at_most_for_secs == 0 {
            return Err(ClientError::Config(
                "lock.at_most_for_secs must be greater than zero".to_string(),
            ));
        }
        if self.at_least_for_secs > self.at_most_for_secs {
            return Err(ClientError::Config(
                "lock.at_least_for_secs must not exceed lock.at_most_for_secs".to_string(),
            ));
        }
        Ok(LockConfig {
            lock_at_most_for: Duration::from_secs(self.at_most_for_secs),
            lock_at_least_for: Duration::from_secs(self.at_least_for_secs),
        })
    }
}

/// Periodic jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Cron schedule of the calendar sync job; unset disables it.
    pub calendar_sync: Option<String>,
    pub jobs: Vec<JobSettings>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            calendar_sync: Some("0 */30 * * * *".to_string()),
            jobs: Vec::new(),
        }
    }
}

/// An external reminder command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    pub name: String,
    /// Defaults to the usual schedule for the known reminder jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl JobSettings {
    pub fn to_job_spec(&self) -> ClientResult<JobSpec> {
        let cron = match (&self.cron, default_cron(&self.name)) {
            (Some(cron), _) => cron.clone(),
            (None, Some(cron)) => cron.to_string(),
            (None, None) => {
                return Err(ClientError::Config(format!(
                    "job {} needs a cron expression",
                    self.name
                )));
            }
        };
        validate_cron(&cron).map_err(|e| {
            ClientError::Config(format!("invalid cron for job {}: {}", self.name, e))
        })?;

        let Some((program, args)) = self.command.split_first() else {
            return Err(ClientError::Config(format!(
                "job {} has an empty command",
                self.name
            )));
        };

        let mut spec = JobSpec::command(&self.name, cron, program, args.to_vec());
        if let (Some(secs), absence_server::JobKind::Command { timeout, .. }) =
            (self.timeout_secs, &mut spec.kind)
        {
            *timeout = Duration::from_secs(secs);
        }
        Ok(spec)
    }
}

impl AppConfig {
    /// Loads `path`, or the default file when `path` is `None`.
    ///
    /// An explicitly given file must exist; a missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("absence")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("absence")
    }

    /// Daemon configuration derived from all sections.
    pub fn server_config(&self) -> ClientResult<ServerConfig> {
        let mut config = ServerConfig::new(self.http.to_http_config()?)
            .with_lock(self.lock.to_lock_config()?);
        if let Some(id) = &self.lock.instance_id {
            config = config.with_instance_id(id.as_str());
        }
        if let Some(cron) = &self.scheduler.calendar_sync {
            validate_cron(cron).map_err(|e| {
                ClientError::Config(format!("invalid scheduler.calendar_sync: {}", e))
            })?;
            config = config.with_job(JobSpec::calendar_sync(cron.as_str()));
        }
        for job in &self.scheduler.jobs {
            config = config.with_job(job.to_job_spec()?);
        }
        Ok(config)
    }

    /// Checks every section without touching storage or the network.
    pub fn validate(&self) -> ClientResult<()> {
        self.logging.tracing_config()?;
        self.server_config()?;
        #[cfg(feature = "google")]
        self.google.to_google_config()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use absence_server::JobKind;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());

        let server = config.server_config().unwrap();
        assert_eq!(server.http.bind, SocketAddr::from(([127, 0, 0, 1], 8087)));
        assert_eq!(server.jobs.len(), 1);
        assert_eq!(server.jobs[0].kind, JobKind::CalendarSync);
        assert_eq!(server.lock, LockConfig::default());
    }

    #[test]
    fn full_config() {
        let config = AppConfig::parse(
            r#"
[logging]
level = "debug"
format = "compact"

[storage]
database_path = "/var/lib/absence/shared.db"

[http]
bind = "0.0.0.0:9000"
public_url = "https://absence.example.com/"
allowed_roles = ["office", "admin"]

[lock]
instance_id = "node-a"
at_most_for_secs = 300
at_least_for_secs = 30

[scheduler]
calendar_sync = "0 0 * * * *"

[[scheduler.jobs]]
name = "WaitingApplicationsReminderNotification"
command = ["absence-notify", "waiting"]

[[scheduler.jobs]]
name = "Digest"
cron = "0 30 8 * * Mon-Fri"
command = ["absence-notify", "digest"]
timeout_secs = 60
"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/var/lib/absence/shared.db")
        );

        let server = config.server_config().unwrap();
        assert_eq!(
            server.http.public_url.as_deref(),
            Some("https://absence.example.com")
        );
        assert_eq!(server.http.allowed_roles, vec!["office", "admin"]);
        assert_eq!(server.instance_id.as_deref(), Some("node-a"));
        assert_eq!(server.lock.lock_at_least_for, Duration::from_secs(30));

        let names: Vec<_> = server.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(
            names,
            ["CalendarSync", "WaitingApplicationsReminderNotification", "Digest"]
        );
        assert_eq!(server.jobs[1].cron, "0 0 7 * * *");
        assert_eq!(
            server.jobs[2].kind,
            JobKind::Command {
                program: "absence-notify".into(),
                args: vec!["digest".into()],
                timeout: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn calendar_sync_can_be_disabled() {
        let mut config = AppConfig::default();
        config.scheduler.calendar_sync = None;
        assert!(config.server_config().unwrap().jobs.is_empty());
    }

    #[test]
    fn unknown_job_needs_cron() {
        let job = JobSettings {
            name: "Digest".into(),
            cron: None,
            command: vec!["true".into()],
            timeout_secs: None,
        };
        assert!(job.to_job_spec().is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = AppConfig::default();
        config.http.bind = "localhost".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.lock.at_least_for_secs = 900;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scheduler.calendar_sync = Some("hourly".into());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scheduler.jobs.push(JobSettings {
            name: "UpcomingApplicationsReminderNotification".into(),
            cron: None,
            command: vec![],
            timeout_secs: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::load(Some(missing.as_path())).is_err());

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\nbind = \"127.0.0.1:1\"\n").unwrap();
        assert_eq!(
            AppConfig::load(Some(path.as_path())).unwrap().http.bind,
            "127.0.0.1:1"
        );
    }

    #[test]
    fn dumps_back_to_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(AppConfig::parse(&text).unwrap(), config);
    }
}
