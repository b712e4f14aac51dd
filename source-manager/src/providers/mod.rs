//! Concrete providers.
//!
//! The set is closed: [`Provider`] dispatches to one of the built-in
//! implementations and is what the registry hands to the engine.

pub mod google_calendar;
pub mod postgres;
pub mod quickbooks;

use async_trait::async_trait;
use pulse::{
    ProviderClient, ProviderError, ResourceFilter, ResourceRecord, Subscription, WebhookDelivery,
};
use reqwest::StatusCode;
use std::time::Duration;

use self::google_calendar::GoogleCalendarProvider;
use self::postgres::PostgresProvider;
use self::quickbooks::QuickBooksProvider;

/// Every provider this host knows how to run.
pub enum Provider {
    GoogleCalendar(GoogleCalendarProvider),
    QuickBooks(QuickBooksProvider),
    Postgres(PostgresProvider),
}

#[async_trait]
impl ProviderClient for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::GoogleCalendar(p) => p.name(),
            Provider::QuickBooks(p) => p.name(),
            Provider::Postgres(p) => p.name(),
        }
    }

    fn required_filters(&self) -> &[&'static str] {
        match self {
            Provider::GoogleCalendar(p) => p.required_filters(),
            Provider::QuickBooks(p) => p.required_filters(),
            Provider::Postgres(p) => p.required_filters(),
        }
    }

    fn supports_webhooks(&self) -> bool {
        match self {
            Provider::GoogleCalendar(p) => p.supports_webhooks(),
            Provider::QuickBooks(p) => p.supports_webhooks(),
            Provider::Postgres(p) => p.supports_webhooks(),
        }
    }

    async fn list_resources(
        &self,
        filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        match self {
            Provider::GoogleCalendar(p) => p.list_resources(filter).await,
            Provider::QuickBooks(p) => p.list_resources(filter).await,
            Provider::Postgres(p) => p.list_resources(filter).await,
        }
    }

    async fn create_subscription(
        &self,
        resource_id: &str,
        callback_url: &str,
        ttl: Duration,
    ) -> Result<Subscription, ProviderError> {
        match self {
            Provider::GoogleCalendar(p) => {
                p.create_subscription(resource_id, callback_url, ttl).await
            }
            Provider::QuickBooks(p) => p.create_subscription(resource_id, callback_url, ttl).await,
            Provider::Postgres(p) => p.create_subscription(resource_id, callback_url, ttl).await,
        }
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), ProviderError> {
        match self {
            Provider::GoogleCalendar(p) => p.delete_subscription(subscription).await,
            Provider::QuickBooks(p) => p.delete_subscription(subscription).await,
            Provider::Postgres(p) => p.delete_subscription(subscription).await,
        }
    }

    fn identity_of(&self, record: &ResourceRecord) -> String {
        match self {
            Provider::GoogleCalendar(p) => p.identity_of(record),
            Provider::QuickBooks(p) => p.identity_of(record),
            Provider::Postgres(p) => p.identity_of(record),
        }
    }

    fn accepts_delivery(&self, delivery: &WebhookDelivery) -> bool {
        match self {
            Provider::GoogleCalendar(p) => p.accepts_delivery(delivery),
            Provider::QuickBooks(p) => p.accepts_delivery(delivery),
            Provider::Postgres(p) => p.accepts_delivery(delivery),
        }
    }

    fn delivery_channel_id(&self, delivery: &WebhookDelivery) -> Option<String> {
        match self {
            Provider::GoogleCalendar(p) => p.delivery_channel_id(delivery),
            Provider::QuickBooks(p) => p.delivery_channel_id(delivery),
            Provider::Postgres(p) => p.delivery_channel_id(delivery),
        }
    }
}

/// Maps an HTTP status from a provider API to the engine's error kinds.
///
/// - 404/410 → the watched channel or resource is gone
/// - 408/429/5xx → transient
/// - other non-2xx → rejected (credentials, permissions, bad request)
pub(crate) fn check_status(status: StatusCode, operation: &str) -> Result<(), ProviderError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(ProviderError::SubscriptionInvalid(
            format!("{} returned {}", operation, status),
        )),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Err(
            ProviderError::Transient(format!("{} returned {}", operation, status)),
        ),
        s if s.is_server_error() => Err(ProviderError::Transient(format!(
            "{} returned {}",
            operation, s
        ))),
        s => Err(ProviderError::Rejected(format!("{} returned {}", operation, s))),
    }
}

/// Network-level request failures are always transient.
pub(crate) fn request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Transient(format!("request failed: {}", e))
}

/// Looks up a required, non-blank filter value.
pub(crate) fn filter_value<'a>(
    filter: &'a ResourceFilter,
    key: &str,
) -> Result<&'a str, ProviderError> {
    filter
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Rejected(format!("missing filter '{}'", key)))
}
