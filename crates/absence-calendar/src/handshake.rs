//! OAuth2 authorization-code handshake for the calendar provider.
//!
//! The handshake spans two HTTP round trips:
//!
//! 1. [`AuthorizationFlowController::begin_handshake`] records an
//!    [`AuthorizationState`] and returns the provider consent URL.
//! 2. The provider redirects back with `code` and `state`;
//!    [`AuthorizationFlowController::complete_handshake`] consumes the pending
//!    state, exchanges the code, probes the calendar and stores the refresh
//!    token.
//!
//! A pending flow is single-use: it is removed from the [`FlowStateStore`]
//! by the first callback, whatever that callback's outcome. A callback that
//! carries a provider error ends it through
//! [`AuthorizationFlowController::abandon_handshake`]. A new
//! `begin_handshake` replaces any earlier pending flow.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::gate::SyncGate;
use crate::pkce::PkceFlow;
use crate::provider::{AuthorizationRequest, CalendarApi, CalendarProbe, ClientIdentity};
use crate::store::CredentialStore;

/// Read/write access to the user's calendars.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// How long a started handshake waits for its callback.
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(10 * 60);

/// Errors surfaced by the handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Client id or secret is not configured.
    #[error("calendar client credentials are not configured: {0}")]
    Configuration(String),

    /// No matching in-flight authorization; the handshake must be restarted.
    #[error("no matching authorization in flight: {0}")]
    FlowState(String),

    /// The provider rejected the code or could not be reached.
    #[error("token exchange failed: {0}")]
    TokenExchange(#[source] ProviderError),

    /// Reading or writing settings or flow state failed.
    #[error("handshake storage failed: {0}")]
    Storage(#[source] ProviderError),
}

impl HandshakeError {
    /// Short reason code used in status-page redirects.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::FlowState(_) => "flow_state",
            Self::TokenExchange(_) => "token_exchange",
            Self::Storage(_) => "storage",
        }
    }
}

/// Pending authorization, awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    /// Correlates the callback with this flow.
    pub state: String,
    /// Sent with the authorization request; the exchange must repeat it.
    pub redirect_uri: String,
    pub scopes: BTreeSet<String>,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationState {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Holds the single pending authorization.
pub trait FlowStateStore: Send + Sync {
    /// Stores `state`, replacing any pending one.
    fn put(&self, state: &AuthorizationState) -> ProviderResult<()>;

    /// Removes and returns the pending state.
    fn take(&self) -> ProviderResult<Option<AuthorizationState>>;
}

/// Process-local flow store. The callback must reach the instance that
/// started the flow.
#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    pending: Mutex<Option<AuthorizationState>>,
}

impl FlowStateStore for MemoryFlowStore {
    fn put(&self, state: &AuthorizationState) -> ProviderResult<()> {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }

    fn take(&self) -> ProviderResult<Option<AuthorizationState>> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take())
    }
}

/// What happened to the calendar probe after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable,
    /// Provider answered with a non-success status.
    Rejected(u16),
    /// Probe could not be performed.
    Failed(String),
    /// No calendar id configured, nothing to probe.
    Skipped,
}

impl ProbeOutcome {
    /// True if the probe produced a warning rather than a confirmation.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::Reachable)
    }
}

/// Result of a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub refresh_token_stored: bool,
    pub probe: ProbeOutcome,
    pub sync_active: bool,
}

/// Drives the authorization-code flow and commits the refresh token.
pub struct AuthorizationFlowController {
    store: Arc<dyn CredentialStore>,
    flows: Arc<dyn FlowStateStore>,
    api: Arc<dyn CalendarApi>,
    gate: Arc<SyncGate>,
    flow_ttl: Duration,
}

impl AuthorizationFlowController {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        flows: Arc<dyn FlowStateStore>,
        api: Arc<dyn CalendarApi>,
        gate: Arc<SyncGate>,
    ) -> Self {
        Self {
            store,
            flows,
            api,
            gate,
            flow_ttl: DEFAULT_FLOW_TTL,
        }
    }

    /// Builder: how long a started flow accepts its callback.
    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    /// Starts a handshake and returns the provider authorization URL.
    ///
    /// `current_request_url` becomes the redirect URI; the callback must
    /// arrive on exactly this URL.
    pub fn begin_handshake(&self, current_request_url: &str) -> Result<String, HandshakeError> {
        let settings = self.store.get().map_err(HandshakeError::Storage)?;
        let credentials = &settings.credentials;
        if !credentials.has_client() {
            return Err(HandshakeError::Configuration(
                "client id and client secret must be set before authorizing".to_string(),
            ));
        }

        let pkce = PkceFlow::new();
        let now = Utc::now();
        let ttl = TimeDelta::from_std(self.flow_ttl).unwrap_or_else(|_| TimeDelta::minutes(10));
        let state = AuthorizationState {
            state: pkce.state.clone(),
            redirect_uri: current_request_url.to_string(),
            scopes: BTreeSet::from([CALENDAR_SCOPE.to_string()]),
            code_verifier: pkce.verifier,
            created_at: now,
            expires_at: now + ttl,
        };

        let url = self.api.authorization_url(&AuthorizationRequest {
            client_id: &credentials.client_id,
            redirect_uri: &state.redirect_uri,
            scopes: &state.scopes,
            state: &state.state,
            code_challenge: &pkce.challenge,
        });

        self.flows.put(&state).map_err(HandshakeError::Storage)?;

        info!(
            provider = self.api.name(),
            redirect_uri = %state.redirect_uri,
            "started calendar authorization"
        );
        debug!(authorization_url = %url, "using authorization url");
        Ok(url)
    }

    /// Completes the handshake started by the most recent
    /// [`begin_handshake`](Self::begin_handshake).
    ///
    /// `state` is the value echoed by the provider. When present it must
    /// match the pending flow.
    pub async fn complete_handshake(
        &self,
        code: &str,
        state: Option<&str>,
        current_request_url: &str,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let flows = self.flows.clone();
        let taken = on_blocking_pool(move || flows.take()).await?;
        let pending = check_pending(taken, state, current_request_url)?;

        let store = self.store.clone();
        let settings = on_blocking_pool(move || store.get()).await?;
        if !settings.credentials.has_client() {
            return Err(HandshakeError::Configuration(
                "client credentials were removed while authorizing".to_string(),
            ));
        }
        let client = ClientIdentity {
            client_id: &settings.credentials.client_id,
            client_secret: &settings.credentials.client_secret,
        };

        let grant = self
            .api
            .exchange_code(client, code, &pending.redirect_uri, &pending.code_verifier)
            .await
            .map_err(|e| {
                error!(provider = self.api.name(), error = %e, "token exchange failed, flow abandoned");
                HandshakeError::TokenExchange(e)
            })?;

        let probe = self.probe(&settings.calendar_id, &grant.access_token).await;

        if grant.refresh_token.is_none() {
            warn!("authorization succeeded, but the provider returned no refresh token");
        } else {
            info!("authorization succeeded");
        }

        let store = self.store.clone();
        let refresh_token = grant.refresh_token;
        let refresh_token_stored = on_blocking_pool(move || {
            // Re-read so concurrent edits of other fields are not reverted.
            let mut updated = store.get()?;
            updated.credentials.refresh_token = refresh_token;
            store.save(&updated)?;
            Ok(updated.credentials.refresh_token().is_some())
        })
        .await?;

        let gate = self.gate.clone();
        let status = on_blocking_pool(move || Ok(gate.reevaluate())).await?;

        Ok(HandshakeOutcome {
            refresh_token_stored,
            probe,
            sync_active: status.active,
        })
    }

    /// Drops the pending flow after the provider reported an error on the
    /// callback. Returns whether a flow was pending.
    pub fn abandon_handshake(&self) -> Result<bool, HandshakeError> {
        let abandoned = self.flows.take().map_err(HandshakeError::Storage)?;
        if let Some(flow) = &abandoned {
            info!(started = %flow.created_at, "calendar authorization abandoned");
        }
        Ok(abandoned.is_some())
    }

    async fn probe(&self, calendar_id: &str, access_token: &str) -> ProbeOutcome {
        if calendar_id.trim().is_empty() {
            warn!("no calendar id configured, skipping calendar probe");
            return ProbeOutcome::Skipped;
        }

        match self.api.probe_calendar(calendar_id, access_token).await {
            Ok(CalendarProbe::Reachable) => {
                debug!(calendar_id, "calendar reachable with new credential");
                ProbeOutcome::Reachable
            }
            Ok(CalendarProbe::Rejected(status)) => {
                warn!(calendar_id, status, "calendar probe rejected, storing credential anyway");
                ProbeOutcome::Rejected(status)
            }
            Err(e) => {
                warn!(calendar_id, error = %e, "calendar probe failed, storing credential anyway");
                ProbeOutcome::Failed(e.to_string())
            }
        }
    }
}

fn check_pending(
    taken: Option<AuthorizationState>,
    state: Option<&str>,
    current_request_url: &str,
) -> Result<AuthorizationState, HandshakeError> {
    let pending = taken.ok_or_else(|| {
        warn!("authorization callback without a pending flow");
        HandshakeError::FlowState("no authorization was started".to_string())
    })?;

    if pending.is_expired(Utc::now()) {
        warn!(started = %pending.created_at, "authorization callback for an expired flow");
        return Err(HandshakeError::FlowState(
            "the authorization flow expired".to_string(),
        ));
    }

    if let Some(state) = state
        && state != pending.state
    {
        warn!("authorization callback state does not match the pending flow");
        return Err(HandshakeError::FlowState(
            "callback does not belong to the pending flow".to_string(),
        ));
    }

    if pending.redirect_uri != current_request_url {
        warn!(
            expected = %pending.redirect_uri,
            actual = %current_request_url,
            "authorization callback arrived on a different URL"
        );
        return Err(HandshakeError::FlowState(
            "callback URL does not match the redirect URI".to_string(),
        ));
    }

    Ok(pending)
}

/// Runs a settings or flow store call on the blocking pool. Both stores do
/// file or SQLite I/O.
async fn on_blocking_pool<T, F>(call: F) -> Result<T, HandshakeError>
where
    F: FnOnce() -> ProviderResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| {
            HandshakeError::Storage(ProviderError::internal(format!("store task failed: {}", e)))
        })?
        .map_err(HandshakeError::Storage)
}
