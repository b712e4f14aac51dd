use crate::provider::ResourceFilter;
use serde::{Deserialize, Serialize};

/// How a source instance learns about changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceMode {
    /// Timer-driven listing and diffing.
    Poll { interval_secs: u64 },
    /// Provider pushes notifications to `callback_url` for `resource_id`.
    Webhook {
        resource_id: String,
        callback_url: String,
    },
}

/// Configuration of one source instance, as given to `activate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Provider name (e.g. "postgres", "google_calendar")
    pub provider: String,

    pub mode: SourceMode,

    /// Provider-specific selection (e.g. `schema = "public"`)
    #[serde(default)]
    pub filter: ResourceFilter,
}

impl SourceConfig {
    pub fn poll(provider: &str, interval_secs: u64) -> Self {
        Self {
            provider: provider.to_string(),
            mode: SourceMode::Poll { interval_secs },
            filter: ResourceFilter::new(),
        }
    }

    pub fn webhook(provider: &str, resource_id: &str, callback_url: &str) -> Self {
        Self {
            provider: provider.to_string(),
            mode: SourceMode::Webhook {
                resource_id: resource_id.to_string(),
                callback_url: callback_url.to_string(),
            },
            filter: ResourceFilter::new(),
        }
    }

    pub fn with_filter(mut self, key: &str, value: &str) -> Self {
        self.filter.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_webhook(&self) -> bool {
        matches!(self.mode, SourceMode::Webhook { .. })
    }

    /// Poll interval in seconds, for poll sources.
    pub fn poll_interval_secs(&self) -> Option<u64> {
        match self.mode {
            SourceMode::Poll { interval_secs } => Some(interval_secs),
            SourceMode::Webhook { .. } => None,
        }
    }

    /// Filter keys from `required` that are missing or blank.
    pub fn missing_filters(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|key| {
                self.filter
                    .get(**key)
                    .map(|v| v.trim().is_empty())
                    .unwrap_or(true)
            })
            .map(|key| key.to_string())
            .collect()
    }
}
