//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::jobs::CALENDAR_SYNC_JOB;
use crate::lock::LockConfig;

/// Path of the authorization endpoint (start and callback).
pub const AUTHORIZE_PATH: &str = "/integration/calendar/authorize";

/// Path of the sync status endpoint.
pub const STATUS_PATH: &str = "/integration/calendar/status";

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub bind: SocketAddr,

    /// Externally visible base URL (scheme, host, optional prefix). When
    /// unset the request's `Host` header is used with `http`.
    pub public_url: Option<String>,

    /// Header set by the reverse proxy carrying the caller's roles.
    pub role_header: String,

    /// Roles allowed to use the endpoints.
    pub allowed_roles: Vec<String>,

    /// Where the browser lands after the handshake.
    pub status_page: String,

    /// Upper bound on handling one request; slower requests get a 408.
    pub connection_timeout: Duration,

    /// Requests handled at once. Further requests wait for a slot.
    pub max_connections: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8087)),
            public_url: None,
            role_header: "X-Remote-Role".to_string(),
            allowed_roles: vec!["office".to_string()],
            status_page: "/settings/calendar-sync".to_string(),
            connection_timeout: Duration::from_secs(30),
            max_connections: 64,
        }
    }
}

impl HttpConfig {
    /// Builder: set the bind address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Builder: set the public base URL.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Builder: set the role header and allowed roles.
    pub fn with_roles(mut self, header: impl Into<String>, roles: Vec<String>) -> Self {
        self.role_header = header.into();
        self.allowed_roles = roles;
        self
    }

    /// Builder: set the status page.
    pub fn with_status_page(mut self, page: impl Into<String>) -> Self {
        self.status_page = page.into();
        self
    }

    /// Builder: set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// What a scheduled job does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Run an external command.
    Command {
        program: String,
        args: Vec<String>,
        timeout: Duration,
    },
    /// Refresh the calendar credential and probe the calendar.
    CalendarSync,
}

/// A named job with its cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Job name, also the lock name.
    pub name: String,
    pub cron: String,
    pub kind: JobKind,
}

impl JobSpec {
    pub fn command(
        name: impl Into<String>,
        cron: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
            kind: JobKind::Command {
                program: program.into(),
                args,
                timeout: crate::jobs::CommandJob::DEFAULT_TIMEOUT,
            },
        }
    }

    pub fn calendar_sync(cron: impl Into<String>) -> Self {
        Self {
            name: CALENDAR_SYNC_JOB.to_string(),
            cron: cron.into(),
            kind: JobKind::CalendarSync,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub lock: LockConfig,
    /// Lock holder identity; generated when unset.
    pub instance_id: Option<String>,
    pub jobs: Vec<JobSpec>,
}

impl ServerConfig {
    pub fn new(http: HttpConfig) -> Self {
        Self {
            http,
            ..Default::default()
        }
    }

    /// Builder: set lock timing.
    pub fn with_lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Builder: set the instance id.
    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// Builder: add a job.
    pub fn with_job(mut self, job: JobSpec) -> Self {
        self.jobs.push(job);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_config() {
        let config = HttpConfig::default();
        assert_eq!(config.role_header, "X-Remote-Role");
        assert_eq!(config.allowed_roles, vec!["office".to_string()]);
        assert_eq!(config.status_page, "/settings/calendar-sync");
        assert!(config.public_url.is_none());
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::new(
            HttpConfig::default()
                .with_public_url("https://absence.example.com/")
                .with_roles("X-Forwarded-Role", vec!["admin".into()])
                .with_connection_timeout(Duration::from_secs(5)),
        )
        .with_instance_id("node-a")
        .with_job(JobSpec::calendar_sync("0 */15 * * * *"));

        assert_eq!(
            config.http.public_url.as_deref(),
            Some("https://absence.example.com")
        );
        assert_eq!(config.http.role_header, "X-Forwarded-Role");
        assert_eq!(config.instance_id.as_deref(), Some("node-a"));
        assert_eq!(config.jobs[0].name, "CalendarSync");
        assert_eq!(config.lock, LockConfig::default());
    }
}
