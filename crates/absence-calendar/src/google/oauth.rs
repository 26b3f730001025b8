//! Google OAuth 2.0 token endpoint calls.
//!
//! The authorization-code flow is server-side: the consent redirect goes to
//! the application's own callback URL, which then exchanges the code here
//! together with the PKCE verifier.

use tracing::{debug, info};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{AuthorizationRequest, ClientIdentity, TokenGrant};

use super::config::GoogleConfig;

/// Builds the Google consent URL.
///
/// Always asks for offline access with forced consent so that Google issues
/// a refresh token even on repeat authorization.
pub fn build_auth_url(auth_url: &str, request: &AuthorizationRequest<'_>) -> String {
    let scope = request
        .scopes
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
        code_challenge={}&code_challenge_method=S256&state={}&\
        access_type=offline&prompt=consent",
        auth_url,
        urlencoding::encode(request.client_id),
        urlencoding::encode(request.redirect_uri),
        urlencoding::encode(&scope),
        urlencoding::encode(request.code_challenge),
        urlencoding::encode(request.state),
    )
}

/// Client for the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: &GoogleConfig, http_client: reqwest::Client) -> Self {
        Self {
            token_url: config.token_url.clone(),
            http_client,
        }
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        client: ClientIdentity<'_>,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", client.client_id),
            ("client_secret", client.client_secret),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let grant = self.post_token(&params, "token exchange").await?;
        info!(
            refresh_token = grant.refresh_token.is_some(),
            "obtained tokens from authorization code"
        );
        Ok(grant)
    }

    /// Refreshes an access token.
    pub async fn refresh_token(
        &self,
        client: ClientIdentity<'_>,
        refresh_token: &str,
    ) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", client.client_id),
            ("client_secret", client.client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let grant = self.post_token(&params, "token refresh").await?;
        debug!(expires_in = ?grant.expires_in, "refreshed access token");
        Ok(grant)
    }

    async fn post_token(&self, params: &[(&str, &str)], what: &str) -> ProviderResult<TokenGrant> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", what, e)).with_source(e)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(token_error(status.as_u16(), &body, what));
        }

        parse_token_response(&body)
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error body from Google's token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn parse_token_response(body: &str) -> ProviderResult<TokenGrant> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))?;

    Ok(TokenGrant {
        access_token: response.access_token,
        refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        expires_in: response.expires_in,
    })
}

fn token_error(status: u16, body: &str, what: &str) -> ProviderError {
    let detail = match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(e) => match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        },
        Err(_) => body.chars().take(200).collect(),
    };
    let message = format!("{} failed ({}): {}", what, status, detail);

    ProviderError::new(ProviderErrorCode::from_token_status(status), message)
}
