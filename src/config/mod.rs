mod env;
mod source;

pub use env::apply_env_overrides;
pub use source::{SourceConfig, SourceMode};

use crate::subscription::{RenewalPolicy, LIFETIME_MILLIS, RENEW_MARGIN_RATIO};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Complete Pulse configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on any single provider call (seconds)
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Webhook subscription lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Requested channel lifetime (milliseconds)
    #[serde(default = "default_lifetime")]
    pub lifetime_millis: i64,
    /// Share of the lifetime reserved for renewal before expiry
    #[serde(default = "default_renew_margin_ratio")]
    pub renew_margin_ratio: f64,
    /// How often webhook sources are checked for renewal (seconds).
    /// Must be shorter than the renewal margin.
    #[serde(default = "default_renewal_check_interval")]
    pub renewal_check_interval_secs: u64,
}

fn default_lifetime() -> i64 {
    LIFETIME_MILLIS
}

fn default_renew_margin_ratio() -> f64 {
    RENEW_MARGIN_RATIO
}

fn default_renewal_check_interval() -> u64 {
    300
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            lifetime_millis: default_lifetime(),
            renew_margin_ratio: default_renew_margin_ratio(),
            renewal_check_interval_secs: default_renewal_check_interval(),
        }
    }
}

impl SubscriptionConfig {
    pub fn renewal_policy(&self) -> Result<RenewalPolicy> {
        RenewalPolicy::from_ratio(self.lifetime_millis, self.renew_margin_ratio).with_context(|| {
            format!(
                "invalid renewal policy: lifetime_millis={} renew_margin_ratio={}",
                self.lifetime_millis, self.renew_margin_ratio
            )
        })
    }

    pub fn renewal_check_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_check_interval_secs)
    }
}

/// State store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// SQLite database path (":memory:" for a throwaway store)
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("pulse_state.db")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL; webhook callbacks are
    /// `{public_url}/webhooks/{source_id}`
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_port() -> u16 {
    3001
}

fn default_public_url() -> String {
    "http://localhost:3001".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

impl ApiConfig {
    pub fn callback_url(&self, source_id: &str) -> String {
        format!("{}/webhooks/{}", self.public_url.trim_end_matches('/'), source_id)
    }
}

/// Downstream event sink configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkConfig {
    /// Endpoint events are POSTed to. Events are only logged when unset.
    #[serde(default)]
    pub url: Option<String>,
    /// Optional bearer token for the sink
    #[serde(default)]
    pub token: Option<String>,
}

impl PulseConfig {
    /// Rejects combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let policy = self.subscription.renewal_policy()?;
        let check_millis = self.subscription.renewal_check_interval_secs.saturating_mul(1000);
        if check_millis == 0 || check_millis >= policy.renew_margin_millis as u64 {
            bail!(
                "renewal_check_interval_secs ({}) must be positive and shorter than the renewal margin ({} ms)",
                self.subscription.renewal_check_interval_secs,
                policy.renew_margin_millis
            );
        }
        if self.engine.provider_timeout_secs == 0 {
            bail!("provider_timeout_secs must be positive");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<PulseConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: PulseConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
