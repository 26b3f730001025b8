//! Google Calendar API v3 client.

use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::CalendarProbe;

/// Thin client over the Calendar API resources the sync needs.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(api_base: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
        }
    }

    /// URL of a calendar resource.
    pub fn calendar_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(calendar_id)
        )
    }

    /// Issues a HEAD request against the calendar resource.
    ///
    /// Any HTTP answer is a probe result; only transport failures are errors.
    pub async fn probe(&self, calendar_id: &str, access_token: &str) -> ProviderResult<CalendarProbe> {
        let url = self.calendar_url(calendar_id);
        let response = self
            .http_client
            .head(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("calendar probe failed: {}", e)).with_source(e)
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(calendar_id, "calendar probe succeeded");
            Ok(CalendarProbe::Reachable)
        } else {
            warn!(calendar_id, status = status.as_u16(), "calendar probe answered with an error status");
            Ok(CalendarProbe::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_url_escapes_id() {
        let client = GoogleCalendarClient::new(
            "https://www.googleapis.com/calendar/v3/",
            reqwest::Client::new(),
        );
        assert_eq!(
            client.calendar_url("absences@group.calendar.google.com"),
            "https://www.googleapis.com/calendar/v3/calendars/absences%40group.calendar.google.com"
        );
    }
}
