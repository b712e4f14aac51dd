//! Error taxonomy for the event source engine.
//!
//! Providers and stores report their own error types; the engine translates
//! them into [`EngineError`] at its boundary so callers only ever see the four
//! operational kinds (plus emit/lookup failures).

use thiserror::Error;

/// Errors reported by a [`ProviderClient`](crate::provider::ProviderClient).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Network failure, timeout, rate limit or 5xx. Retried on the next tick.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider no longer recognises the channel or watched resource.
    #[error("subscription no longer valid: {0}")]
    SubscriptionInvalid(String),

    /// The provider refused the request (bad credentials, bad filter, 4xx).
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The provider does not implement this capability.
    #[error("operation not supported by provider: {0}")]
    Unsupported(&'static str),
}

/// Errors reported by a [`StateStore`](crate::state::StateStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by an [`EmitSink`](crate::event::EmitSink).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("emit failed: {0}")]
pub struct EmitError(pub String);

/// Errors surfaced by [`EventSourceEngine`](crate::engine::EventSourceEngine) operations.
///
/// Every variant guarantees that no partial state was written for the failed
/// invocation: no baseline advance without full emission and no subscription
/// overwrite without a confirmed creation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network/timeout/rate-limit. Retry on the next scheduled invocation.
    #[error("transient provider error ({provider}): {message}")]
    TransientProvider { provider: String, message: String },

    /// The provider invalidated the current channel. The subscription is
    /// marked expired so the next renewal check re-activates it.
    #[error("subscription {channel_id} is no longer valid: {message}")]
    SubscriptionInvalid { channel_id: String, message: String },

    /// Reading or writing the source's state failed. Nothing was emitted.
    #[error("state store error: {0}")]
    StateStore(#[from] StoreError),

    /// Operator-facing configuration problem. Not retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The downstream sink refused an event. The baseline was not advanced.
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// A provider record could not be turned into a valid event. Nothing in
    /// the batch was emitted and the baseline was not advanced.
    #[error("invalid event '{event_id}': {reason}")]
    InvalidEvent { event_id: String, reason: String },

    /// The source instance has not been activated (or was deactivated).
    #[error("source '{0}' is not active")]
    UnknownSource(String),
}

impl EngineError {
    /// Translates a provider error raised while serving `provider`.
    ///
    /// `channel_id` is the subscription the call was made on behalf of, if any.
    pub fn from_provider(provider: &str, channel_id: Option<&str>, err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(message) => EngineError::TransientProvider {
                provider: provider.to_string(),
                message,
            },
            ProviderError::SubscriptionInvalid(message) => EngineError::SubscriptionInvalid {
                channel_id: channel_id.unwrap_or_default().to_string(),
                message,
            },
            ProviderError::Rejected(message) => {
                EngineError::Configuration(format!("{} rejected request: {}", provider, message))
            }
            ProviderError::Unsupported(op) => {
                EngineError::Configuration(format!("{} does not support {}", provider, op))
            }
        }
    }

    /// Returns true if the failed invocation should simply be retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::TransientProvider { .. } | EngineError::Emit(_) | EngineError::StateStore(_)
        )
    }
}
