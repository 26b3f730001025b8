//! [`CalendarApi`] implementation for Google Calendar.

use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{
    AuthorizationRequest, BoxFuture, CalendarApi, CalendarProbe, ClientIdentity, TokenGrant,
};

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::{OAuthClient, build_auth_url};

const PROVIDER_NAME: &str = "google";

/// Google Calendar provider.
///
/// Stateless apart from the shared HTTP connection pool; credentials are
/// passed in on every call and live in the credential store.
#[derive(Debug, Clone)]
pub struct GoogleCalendarApi {
    config: GoogleConfig,
    oauth: OAuthClient,
    calendar: GoogleCalendarClient,
}

impl GoogleCalendarApi {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        debug!(token_url = %config.token_url, api_base = %config.api_base, "created google calendar api");
        Ok(Self {
            oauth: OAuthClient::new(&config, http_client.clone()),
            calendar: GoogleCalendarClient::new(&config.api_base, http_client),
            config,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }
}

impl CalendarApi for GoogleCalendarApi {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> String {
        build_auth_url(&self.config.auth_url, request)
    }

    fn exchange_code<'a>(
        &'a self,
        client: ClientIdentity<'a>,
        code: &'a str,
        redirect_uri: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(async move {
            self.oauth
                .exchange_code(client, code, redirect_uri, code_verifier)
                .await
                .map_err(|e| e.for_api(PROVIDER_NAME))
        })
    }

    fn refresh_access_token<'a>(
        &'a self,
        client: ClientIdentity<'a>,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(async move {
            self.oauth
                .refresh_token(client, refresh_token)
                .await
                .map_err(|e| e.for_api(PROVIDER_NAME))
        })
    }

    fn probe_calendar<'a>(
        &'a self,
        calendar_id: &'a str,
        access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<CalendarProbe>> {
        Box::pin(async move {
            self.calendar
                .probe(calendar_id, access_token)
                .await
                .map_err(|e| e.for_api(PROVIDER_NAME))
        })
    }
}
