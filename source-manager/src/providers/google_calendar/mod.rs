pub mod api;
pub mod config;
pub mod transformer;

use async_trait::async_trait;
use chrono::Utc;
use pulse::{
    ProviderClient, ProviderError, ResourceFilter, ResourceRecord, Subscription, WebhookDelivery,
};
use std::time::Duration;

use self::api::GoogleCalendarClient;
use self::config::{GoogleCalendarConfig, CHANNEL_ID_HEADER, RESOURCE_STATE_HEADER, SYNC_STATE};
use self::transformer::{event_identity, event_to_record};
use super::filter_value;

pub const NAME: &str = "google_calendar";

/// Filter key selecting the calendar to list (e.g. "primary").
pub const CALENDAR_FILTER: &str = "calendar_id";

/// Google Calendar provider - lists calendar events and watches a calendar
/// through `events.watch` notification channels.
pub struct GoogleCalendarProvider {
    client: GoogleCalendarClient,
}

impl GoogleCalendarProvider {
    pub fn new(config: GoogleCalendarConfig) -> Self {
        Self {
            client: GoogleCalendarClient::with_base_url(config.access_token, config.base_url),
        }
    }

    /// Create a provider against a custom API base URL (for testing).
    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            client: GoogleCalendarClient::with_base_url(access_token, base_url),
        }
    }
}

#[async_trait]
impl ProviderClient for GoogleCalendarProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn required_filters(&self) -> &[&'static str] {
        &[CALENDAR_FILTER]
    }

    fn supports_webhooks(&self) -> bool {
        true
    }

    async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let calendar_id = filter_value(filter, CALENDAR_FILTER)?;
        let events = self.client.list_events(calendar_id).await?;
        Ok(events.into_iter().filter_map(event_to_record).collect())
    }

    /// Watches `resource_id` (a calendar id). Google may grant a shorter
    /// lifetime than requested; the returned expiry is the granted one.
    async fn create_subscription(
        &self,
        resource_id: &str,
        callback_url: &str,
        ttl: Duration,
    ) -> Result<Subscription, ProviderError> {
        let channel_id = uuid::Uuid::new_v4().to_string();
        let requested = Utc::now().timestamp_millis() + ttl.as_millis() as i64;

        let channel = self
            .client
            .watch_events(resource_id, &channel_id, callback_url, requested)
            .await?;
        let expires_at = channel.expiration_millis().unwrap_or(requested);

        tracing::debug!(
            channel_id = %channel.id,
            calendar_id = %resource_id,
            expires_at = expires_at,
            "Opened calendar notification channel"
        );
        Ok(Subscription::new(channel.id, channel.resource_id, expires_at))
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), ProviderError> {
        self.client
            .stop_channel(&subscription.channel_id, &subscription.resource_id)
            .await
    }

    fn identity_of(&self, record: &ResourceRecord) -> String {
        event_identity(record)
    }

    /// The `sync` message only confirms a new channel; it carries no change.
    fn accepts_delivery(&self, delivery: &WebhookDelivery) -> bool {
        delivery.header(RESOURCE_STATE_HEADER) != Some(SYNC_STATE)
    }

    fn delivery_channel_id(&self, delivery: &WebhookDelivery) -> Option<String> {
        delivery.header(CHANNEL_ID_HEADER).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn delivery(headers: &[(&str, &str)]) -> WebhookDelivery {
        WebhookDelivery {
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_provider_metadata() {
        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), "http://x".to_string());
        assert_eq!(provider.name(), "google_calendar");
        assert!(provider.supports_webhooks());
        assert_eq!(provider.required_filters(), &["calendar_id"]);
    }

    #[test]
    fn test_delivery_handling() {
        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), "http://x".to_string());

        let sync = delivery(&[
            ("x-goog-channel-id", "chan-1"),
            ("x-goog-resource-state", "sync"),
        ]);
        assert_eq!(provider.delivery_channel_id(&sync).as_deref(), Some("chan-1"));
        assert!(!provider.accepts_delivery(&sync));

        let exists = delivery(&[
            ("x-goog-channel-id", "chan-1"),
            ("x-goog-resource-state", "exists"),
        ]);
        assert!(provider.accepts_delivery(&exists));

        assert!(provider.delivery_channel_id(&delivery(&[])).is_none());
    }

    #[tokio::test]
    async fn test_list_resources() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Regex(r"^/calendars/work@example\.com/events".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"items": [
                    {"id": "e1", "summary": "Standup", "updated": "2026-02-18T09:30:00Z"},
                    {"summary": "no id"},
                    {"id": "e2", "summary": "Retro", "updated": "2026-02-18T10:00:00Z"}
                ]}"#,
            )
            .create_async()
            .await;

        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), server.url());
        let mut filter = ResourceFilter::new();
        filter.insert(CALENDAR_FILTER.to_string(), "work@example.com".to_string());

        let records = provider.list_resources(&filter).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].summary, "Calendar event: Standup");
        assert_eq!(provider.identity_of(&records[1]), "e2:2026-02-18T10:00:00Z");
    }

    #[tokio::test]
    async fn test_list_resources_requires_calendar() {
        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), "http://x".to_string());
        let err = provider.list_resources(&ResourceFilter::new()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_create_subscription_uses_granted_expiry() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/calendars/primary/events/watch")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "chan-9", "resourceId": "res-9", "expiration": "1700000000000"}"#)
            .create_async()
            .await;

        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), server.url());
        let subscription = provider
            .create_subscription(
                "primary",
                "https://hooks.example.com/webhooks/gcal",
                Duration::from_secs(86_400),
            )
            .await
            .unwrap();

        assert_eq!(subscription.channel_id, "chan-9");
        assert_eq!(subscription.resource_id, "res-9");
        assert_eq!(subscription.expires_at_epoch_millis, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_delete_subscription_stops_channel() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/channels/stop")
            .match_body(Matcher::Json(serde_json::json!({
                "id": "chan-9",
                "resourceId": "res-9"
            })))
            .with_status(204)
            .create_async()
            .await;

        let provider = GoogleCalendarProvider::with_base_url("t".to_string(), server.url());
        provider
            .delete_subscription(&Subscription::new(
                "chan-9".to_string(),
                "res-9".to_string(),
                0,
            ))
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
