//! Webhook subscription model and renewal policy.

use serde::{Deserialize, Serialize};

mod scheduler;
#[cfg(test)]
mod tests;

pub use scheduler::{RenewalDecision, SubscriptionPhase, SubscriptionScheduler};

/// Lifetime of a webhook channel under the 24-hour provider convention.
pub const LIFETIME_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Fraction of the lifetime reserved for renewal before expiry.
pub const RENEW_MARGIN_RATIO: f64 = 0.05;

/// `LIFETIME_MILLIS * RENEW_MARGIN_RATIO` (72 minutes).
pub const RENEW_MARGIN_MILLIS: i64 = 4_320_000;

/// A provider-side webhook registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Id of the notification channel; deliveries carry it back
    pub channel_id: String,

    /// Provider's id for the watched resource (needed to stop the channel)
    pub resource_id: String,

    pub expires_at_epoch_millis: i64,

    pub renew_margin_millis: i64,
}

impl Subscription {
    /// Creates a subscription with no renewal margin yet; see
    /// [`RenewalPolicy::apply`].
    pub fn new(channel_id: String, resource_id: String, expires_at_epoch_millis: i64) -> Self {
        Self {
            channel_id,
            resource_id,
            expires_at_epoch_millis,
            renew_margin_millis: 0,
        }
    }

    /// Moment from which renewal is due.
    pub fn renew_at(&self) -> i64 {
        self.expires_at_epoch_millis - self.renew_margin_millis
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at_epoch_millis
    }
}

/// Persisted subscription together with its validity flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription: Subscription,

    /// Set when the provider reported the channel invalid before expiry
    #[serde(default)]
    pub invalidated: bool,
}

impl SubscriptionState {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            invalidated: false,
        }
    }
}

/// Derives renewal margins from the subscription lifetime.
///
/// Invariant: `0 < renew_margin_millis < lifetime_millis`, so `renew_at`
/// strictly precedes `expires_at`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenewalPolicy {
    pub lifetime_millis: i64,
    pub renew_margin_millis: i64,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            lifetime_millis: LIFETIME_MILLIS,
            renew_margin_millis: RENEW_MARGIN_MILLIS,
        }
    }
}

impl RenewalPolicy {
    /// Builds a policy where the margin is `ratio` of `lifetime_millis`.
    ///
    /// Returns `None` if the result would violate the margin invariant.
    pub fn from_ratio(lifetime_millis: i64, ratio: f64) -> Option<Self> {
        if lifetime_millis <= 0 || !(ratio > 0.0 && ratio < 1.0) {
            return None;
        }
        let renew_margin_millis = (lifetime_millis as f64 * ratio).round() as i64;
        if renew_margin_millis <= 0 || renew_margin_millis >= lifetime_millis {
            return None;
        }
        Some(Self {
            lifetime_millis,
            renew_margin_millis,
        })
    }

    /// Requested channel lifetime, as handed to the provider.
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lifetime_millis as u64)
    }

    /// Margin for a channel the provider actually granted `granted_millis` of
    /// lifetime. Providers may shorten the requested lifetime; the fixed margin
    /// is kept whenever it still leaves a renewal window, otherwise it scales
    /// down to the same ratio of the granted lifetime, never below 1 ms while
    /// the grant leaves room for one.
    pub fn margin_for(&self, granted_millis: i64) -> i64 {
        if self.renew_margin_millis < granted_millis {
            return self.renew_margin_millis;
        }
        if granted_millis <= 1 {
            return 0;
        }
        let ratio = self.renew_margin_millis as f64 / self.lifetime_millis as f64;
        ((granted_millis as f64 * ratio) as i64).max(1)
    }

    /// Fills in the renewal margin of a freshly created subscription.
    pub fn apply(&self, mut subscription: Subscription, created_at: i64) -> Subscription {
        let granted = subscription.expires_at_epoch_millis - created_at;
        subscription.renew_margin_millis = self.margin_for(granted);
        subscription
    }
}
