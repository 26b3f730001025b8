//! The provider-facing seam used by the handshake and sync jobs.
//!
//! [`CalendarApi`] captures the few calls the core needs from an external
//! calendar provider: building the consent URL, exchanging an authorization
//! code, refreshing an access token and probing the configured calendar.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the trait object-safe so the controller can hold an
/// `Arc<dyn CalendarApi>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// OAuth client identity used against the token endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ClientIdentity<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Parameters of the user-facing authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a BTreeSet<String>,
    /// Opaque value echoed back on the callback.
    pub state: &'a str,
    /// PKCE S256 challenge.
    pub code_challenge: &'a str,
}

/// Tokens returned by the provider's token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Providers may omit this on repeat consent.
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of probing the configured calendar with a fresh credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarProbe {
    /// The provider answered with a success status.
    Reachable,
    /// The provider answered, but not with success (status code attached).
    Rejected(u16),
}

/// Calls the core makes against an external calendar provider.
pub trait CalendarApi: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Builds the authorization URL the user is redirected to.
    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> String;

    /// Exchanges an authorization code for tokens.
    ///
    /// `redirect_uri` must be identical to the one sent with the
    /// authorization request.
    fn exchange_code<'a>(
        &'a self,
        client: ClientIdentity<'a>,
        code: &'a str,
        redirect_uri: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>>;

    /// Obtains a fresh access token from a refresh token.
    fn refresh_access_token<'a>(
        &'a self,
        client: ClientIdentity<'a>,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>>;

    /// Lightweight existence check of a calendar resource.
    fn probe_calendar<'a>(
        &'a self,
        calendar_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<CalendarProbe>>;
}
