//! CLI error types.

use std::fmt;

use absence_calendar::ProviderError;
use absence_core::TracingError;
use absence_server::ServerError;

/// Result type for CLI operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the CLI.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// A `pass::` or `env::` reference could not be resolved.
    Secret(String),
    /// Calendar provider or settings store error.
    Provider(ProviderError),
    /// Daemon, lock store or scheduler error.
    Server(ServerError),
    /// Logging could not be initialised.
    Tracing(TracingError),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Secret(msg) => write!(f, "secret resolution failed: {}", msg),
            Self::Provider(err) => write!(f, "calendar error: {}", err),
            Self::Server(err) => write!(f, "daemon error: {}", err),
            Self::Tracing(err) => write!(f, "logging setup failed: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provider(err) => Some(err),
            Self::Server(err) => Some(err),
            Self::Tracing(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Config(_) | Self::Secret(_) => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<TracingError> for ClientError {
    fn from(err: TracingError) -> Self {
        Self::Tracing(err)
    }
}
