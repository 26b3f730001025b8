//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use absence_calendar::{
    AuthorizationRequest, BoxFuture, CalendarApi, CalendarProbe, ClientIdentity,
    ProviderCredentials, ProviderError, ProviderKind, ProviderResult, SyncSettings, TokenGrant,
};
use chrono::{DateTime, TimeDelta, Utc};

use crate::lock::Clock;

/// Manually advanced clock.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            DateTime::parse_from_rfc3339("2026-03-02T07:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += TimeDelta::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Scripted calendar provider.
pub struct FakeCalendarApi {
    pub probe: CalendarProbe,
    /// Refresh token returned by exchanges and refreshes.
    pub refresh_token: Option<&'static str>,
    pub exchange_fails: bool,
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub probed: Mutex<Vec<String>>,
}

impl FakeCalendarApi {
    pub fn new() -> Self {
        Self {
            probe: CalendarProbe::Reachable,
            refresh_token: None,
            exchange_fails: false,
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            probed: Mutex::new(Vec::new()),
        }
    }

    fn grant(&self) -> TokenGrant {
        TokenGrant {
            access_token: "ya29.access".to_string(),
            refresh_token: self.refresh_token.map(String::from),
            expires_in: Some(3599),
        }
    }
}

impl CalendarApi for FakeCalendarApi {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> String {
        format!(
            "https://provider.test/auth?state={}&redirect_uri={}",
            request.state,
            urlencoding::encode(request.redirect_uri)
        )
    }

    fn exchange_code<'a>(
        &'a self,
        _client: ClientIdentity<'a>,
        _code: &'a str,
        _redirect_uri: &'a str,
        _code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let result = if self.exchange_fails {
            Err(ProviderError::authentication("invalid_grant"))
        } else {
            Ok(self.grant())
        };
        Box::pin(async move { result })
    }

    fn refresh_access_token<'a>(
        &'a self,
        _client: ClientIdentity<'a>,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let grant = self.grant();
        Box::pin(async move { Ok(grant) })
    }

    fn probe_calendar<'a>(
        &'a self,
        calendar_id: &'a str,
        _access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<CalendarProbe>> {
        self.probed.lock().unwrap().push(calendar_id.to_string());
        let probe = self.probe;
        Box::pin(async move { Ok(probe) })
    }
}

/// Settings with client credentials and a calendar; `refresh_token` decides
/// whether sync is active.
pub fn settings(refresh_token: Option<&str>) -> SyncSettings {
    let mut credentials =
        ProviderCredentials::new("client.apps.googleusercontent.com", "secret");
    credentials.refresh_token = refresh_token.map(String::from);
    SyncSettings {
        provider: ProviderKind::Google,
        credentials,
        calendar_id: "team@group.calendar.google.com".into(),
    }
}
