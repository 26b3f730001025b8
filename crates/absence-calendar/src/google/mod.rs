//! Google Calendar provider implementation.
//!
//! # Authentication Flow
//!
//! 1. An administrator stores the OAuth client id/secret of a Google Cloud
//!    "web application" client
//! 2. The application redirects the browser to Google's consent page with a
//!    PKCE challenge and `access_type=offline`
//! 3. Google redirects back to the application's callback URL with a code
//! 4. The code is exchanged for an access token and a refresh token
//! 5. The calendar is probed with a HEAD request and the refresh token is
//!    stored
//!
//! Later sync runs trade the refresh token for a short-lived access token.

mod client;
mod config;
mod oauth;
mod provider;

pub use client::GoogleCalendarClient;
pub use config::{
    CALENDAR_API_BASE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig, credentials_from_file,
    credentials_from_json, validate_client_id,
};
pub use oauth::{OAuthClient, build_auth_url};
pub use provider::GoogleCalendarApi;
