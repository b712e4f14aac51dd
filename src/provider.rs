//! Provider capability interface.
//!
//! A provider is one external system (a calendar API, an accounting API, a
//! database). The engine only needs three things from it: list the current
//! resources, register a webhook channel, and unregister one.

use crate::error::ProviderError;
use crate::subscription::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Provider-specific selection of resources (e.g. `schema`, `calendar_id`).
pub type ResourceFilter = BTreeMap<String, String>;

/// One resource as reported by a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Provider-assigned identifier
    pub id: String,

    /// Human-readable one-liner used as the event summary
    pub summary: String,

    /// Provider-reported modification/creation time (epoch ms), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Full record as returned by the provider
    pub data: Value,
}

/// An inbound webhook call, as received by the host.
#[derive(Clone, Debug, Default)]
pub struct WebhookDelivery {
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl WebhookDelivery {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Capability over one external system.
///
/// # Lifecycle
/// 1. Engine calls `required_filters()` when a source is activated
/// 2. Webhook sources: `create_subscription()` on activation and renewal,
///    `delete_subscription()` on supersession and deactivation
/// 3. `list_resources()` on every poll tick or accepted delivery
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Unique identifier (e.g. "google_calendar", "postgres").
    fn name(&self) -> &str;

    /// Filter keys that must be present in a source's configuration.
    fn required_filters(&self) -> &[&'static str] {
        &[]
    }

    /// Whether this provider can push changes through webhooks.
    fn supports_webhooks(&self) -> bool {
        false
    }

    /// Fetches the current collection selected by `filter`.
    async fn list_resources(&self, filter: &ResourceFilter)
        -> Result<Vec<ResourceRecord>, ProviderError>;

    /// Registers a webhook channel on `resource_id` delivering to `callback_url`.
    ///
    /// The returned subscription carries the provider-granted expiry; the
    /// engine fills in the renewal margin.
    async fn create_subscription(
        &self,
        _resource_id: &str,
        _callback_url: &str,
        _ttl: Duration,
    ) -> Result<Subscription, ProviderError> {
        Err(ProviderError::Unsupported("webhook subscriptions"))
    }

    /// Stops a previously created channel.
    async fn delete_subscription(&self, _subscription: &Subscription) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("webhook subscriptions"))
    }

    /// Identity used for dedup. Two records with the same identity are the
    /// same logical occurrence.
    fn identity_of(&self, record: &ResourceRecord) -> String {
        record.id.clone()
    }

    /// Whether a delivery that passed the channel check carries a change
    /// notification (as opposed to a handshake/control message).
    fn accepts_delivery(&self, _delivery: &WebhookDelivery) -> bool {
        true
    }

    /// Extracts the channel id a delivery was sent on.
    ///
    /// Defaults to the `x-channel-id` header, then a `channelId` body field.
    fn delivery_channel_id(&self, delivery: &WebhookDelivery) -> Option<String> {
        delivery
            .header("x-channel-id")
            .map(str::to_string)
            .or_else(|| {
                delivery
                    .body
                    .get("channelId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
    }
}
