//! Log output for the `absence` binary.
//!
//! The daemon logs JSON lines at `info`. One-shot commands stay quiet
//! unless `--debug` is given. `RUST_LOG` replaces the computed filter
//! when it is set.

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*, util::TryInitError};

/// Targets whose level follows [`TracingConfig::level`]. `tower_http`
/// carries the per-request spans of the HTTP endpoints.
const TARGETS: &[&str] = &[
    "absence",
    "absence_cli",
    "absence_core",
    "absence_calendar",
    "absence_server",
    "tower_http",
];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("logging is already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format '{0}' (expected pretty, compact or json)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    Compact,
    /// One object per line, for journald and log shippers.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// How the process logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Prefix lines with file and line number.
    pub source_locations: bool,
    pub timestamps: bool,
    /// Explicit filter directives. Overrides both `level` and `RUST_LOG`.
    pub directives: Option<String>,
}

impl Default for TracingConfig {
    /// Quiet output for one-shot commands such as `absence settings show`.
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: TracingOutputFormat::Compact,
            source_locations: false,
            timestamps: false,
            directives: None,
        }
    }
}

impl TracingConfig {
    /// One-shot commands run with `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            source_locations: true,
            ..Self::default()
        }
    }

    /// `absence serve`.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Json,
            timestamps: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// Filter used when neither explicit directives nor `RUST_LOG` are set.
    pub fn default_directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(directives) = &self.directives {
            return Ok(EnvFilter::try_new(directives)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives())))
    }
}

/// Installs the global subscriber. Call once, before the runtime starts
/// doing work.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let locations = config.source_locations;

    let output = match (config.format, config.timestamps) {
        (TracingOutputFormat::Json, _) => fmt::layer()
            .json()
            .with_file(locations)
            .with_line_number(locations)
            .boxed(),
        (TracingOutputFormat::Pretty, _) => fmt::layer()
            .pretty()
            .with_file(locations)
            .with_line_number(locations)
            .boxed(),
        (TracingOutputFormat::Compact, true) => fmt::layer()
            .compact()
            .with_file(locations)
            .with_line_number(locations)
            .boxed(),
        (TracingOutputFormat::Compact, false) => fmt::layer()
            .compact()
            .without_time()
            .with_file(locations)
            .with_line_number(locations)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles() {
        let daemon = TracingConfig::daemon();
        assert_eq!(daemon.level, Level::INFO);
        assert_eq!(daemon.format, TracingOutputFormat::Json);
        assert!(daemon.timestamps);

        let debug = TracingConfig::cli_debug();
        assert_eq!(debug.level, Level::DEBUG);
        assert!(debug.source_locations);
        assert!(!debug.timestamps);

        assert_eq!(TracingConfig::default().level, Level::WARN);
    }

    #[test]
    fn default_directives_cover_every_crate() {
        let directives = TracingConfig::daemon()
            .with_level(Level::DEBUG)
            .default_directives();

        assert!(directives.starts_with("absence=debug,absence_cli=debug,"));
        assert!(directives.contains("absence_server=debug"));
        assert!(directives.ends_with("tower_http=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn explicit_directives_must_parse() {
        let config = TracingConfig::default().with_directives("absence_server=lots");
        assert!(matches!(config.filter(), Err(TracingError::Filter(_))));

        let config = TracingConfig::default().with_directives("absence_server::lock=trace");
        assert!(config.filter().is_ok());
    }

    #[test]
    fn format_names() {
        assert_eq!(
            "JSON".parse::<TracingOutputFormat>().unwrap(),
            TracingOutputFormat::Json
        );
        assert!(matches!(
            "xml".parse::<TracingOutputFormat>(),
            Err(TracingError::UnknownFormat(name)) if name == "xml"
        ));
    }
}
