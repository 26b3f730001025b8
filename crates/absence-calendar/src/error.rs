//! Errors raised by the calendar API client and the settings store.
//!
//! The handshake has its own taxonomy in
//! [`HandshakeError`](crate::handshake::HandshakeError); it wraps a
//! [`ProviderError`] whenever Google or local storage is what failed.

use std::fmt;

use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// What went wrong, coarse enough for callers to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Google rejected the client or the grant (`invalid_client`, `invalid_grant`).
    Authentication,
    /// The token is valid but lacks a scope.
    Authorization,
    /// The request never got an answer.
    Network,
    /// Google asked us to slow down.
    RateLimited,
    /// Google answered with a 5xx.
    Upstream,
    /// Google answered with something we could not read.
    InvalidResponse,
    /// The client secret or endpoints are unusable.
    Configuration,
    /// The settings file or the flow table could not be read or written.
    Storage,
    Internal,
}

impl ProviderErrorCode {
    /// Classifies a non-2xx answer from the token endpoint.
    ///
    /// Google reports a bad code or a revoked refresh token as 400
    /// `invalid_grant`, so 400 counts as an authentication failure.
    pub fn from_token_status(status: u16) -> Self {
        match status {
            400 | 401 => Self::Authentication,
            403 => Self::Authorization,
            429 => Self::RateLimited,
            500..=599 => Self::Upstream,
            _ => Self::InvalidResponse,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::Upstream => "upstream",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to Google or to local storage.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// Name of the calendar API that answered, when one did.
    api: Option<&'static str>,
    #[source]
    source: Option<BoxedSource>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            api: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Authentication, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Internal, message)
    }

    /// Tags the error with the calendar API it came from.
    pub fn for_api(mut self, name: &'static str) -> Self {
        self.api = Some(name);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn api(&self) -> Option<&'static str> {
        self.api
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(api) = self.api {
            write!(f, "{api}: ")?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
