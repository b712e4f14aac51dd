use pulse::ProviderError;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{api, BASE_URL, CHANNEL_TYPE, MAX_RESULTS};
use crate::providers::{check_status, request_error};

/// One page of `events.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<Value>,
    next_page_token: Option<String>,
}

/// Body of `events.watch`.
#[derive(Debug, Serialize)]
struct WatchRequest<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    channel_type: &'a str,
    address: &'a str,
    /// Epoch milliseconds, as a string
    expiration: String,
}

/// Body of `channels.stop`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopRequest<'a> {
    id: &'a str,
    resource_id: &'a str,
}

/// Notification channel returned by `events.watch`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub resource_id: String,
    /// Epoch milliseconds, as a string
    #[serde(default)]
    pub expiration: Option<String>,
}

impl Channel {
    pub fn expiration_millis(&self) -> Option<i64> {
        self.expiration.as_deref().and_then(|e| e.parse().ok())
    }
}

/// HTTP client for the Google Calendar v3 REST API.
pub struct GoogleCalendarClient {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            access_token,
            http_client: Client::new(),
            base_url,
        }
    }

    /// `events.list` over every page of the calendar.
    pub async fn list_events(&self, calendar_id: &str) -> Result<Vec<Value>, ProviderError> {
        let url = self.url(&[api::CALENDARS, calendar_id, api::EVENTS])?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(url.clone())
                .bearer_auth(&self.access_token)
                .query(&[("singleEvents", "true")])
                .query(&[("maxResults", MAX_RESULTS)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(request_error)?;
            check_status(response.status(), "events.list")?;
            let page: EventsPage = response.json().await.map_err(|e| {
                ProviderError::Transient(format!("failed to parse events.list response: {}", e))
            })?;

            items.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    /// `events.watch`: opens a notification channel on the calendar.
    pub async fn watch_events(
        &self,
        calendar_id: &str,
        channel_id: &str,
        address: &str,
        expiration_millis: i64,
    ) -> Result<Channel, ProviderError> {
        let url = self.url(&[api::CALENDARS, calendar_id, api::EVENTS, api::WATCH])?;
        let body = WatchRequest {
            id: channel_id,
            channel_type: CHANNEL_TYPE,
            address,
            expiration: expiration_millis.to_string(),
        };

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status(), "events.watch")?;
        response.json::<Channel>().await.map_err(|e| {
            ProviderError::Transient(format!("failed to parse events.watch response: {}", e))
        })
    }

    /// `channels.stop`. A 404 means the channel is already gone.
    pub async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&[api::CHANNELS, api::STOP])?;
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&StopRequest {
                id: channel_id,
                resource_id,
            })
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status(), "channels.stop")
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Rejected(format!("invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Rejected(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
