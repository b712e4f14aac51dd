use super::{Subscription, SubscriptionState};
use serde::Serialize;

/// Lifecycle position of a source's subscription at a given instant.
///
/// `Renewing` is not represented: it only exists while the engine is
/// between creating the replacement and calling
/// [`SubscriptionScheduler::on_renewed`], and a failed renewal leaves the
/// state `RenewalDue` so the next check retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPhase {
    Unregistered,
    Active,
    RenewalDue,
    Expired,
}

/// What the caller has to do after a scheduling check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalDecision {
    NoAction,
    RenewNow,
    /// No usable subscription: (re)create one from scratch
    Expired,
}

/// Tracks the single subscription of one source instance.
///
/// Pure decision logic: the scheduler never talks to a provider. The engine
/// performs the I/O and feeds the results back through
/// [`on_renewed`](Self::on_renewed), [`mark_invalid`](Self::mark_invalid)
/// and [`clear`](Self::clear).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriptionScheduler {
    state: Option<SubscriptionState>,
}

impl SubscriptionScheduler {
    pub fn new(state: Option<SubscriptionState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Option<&SubscriptionState> {
        self.state.as_ref()
    }

    pub fn into_state(self) -> Option<SubscriptionState> {
        self.state
    }

    pub fn current(&self) -> Option<&Subscription> {
        self.state.as_ref().map(|s| &s.subscription)
    }

    pub fn phase(&self, now: i64) -> SubscriptionPhase {
        match &self.state {
            None => SubscriptionPhase::Unregistered,
            Some(s) if s.invalidated || s.subscription.is_expired(now) => {
                SubscriptionPhase::Expired
            }
            Some(s) if now >= s.subscription.renew_at() => SubscriptionPhase::RenewalDue,
            Some(_) => SubscriptionPhase::Active,
        }
    }

    /// Decides whether the subscription needs attention at `now`.
    ///
    /// Renewal is due from `renew_at` inclusive up to `expires_at` exclusive.
    /// From `expires_at` on (or once invalidated, or when nothing is
    /// registered) the answer is `Expired`.
    pub fn check_and_renew(&self, now: i64) -> RenewalDecision {
        match self.phase(now) {
            SubscriptionPhase::Active => RenewalDecision::NoAction,
            SubscriptionPhase::RenewalDue => RenewalDecision::RenewNow,
            SubscriptionPhase::Unregistered | SubscriptionPhase::Expired => {
                RenewalDecision::Expired
            }
        }
    }

    /// Installs `new` as the active subscription.
    ///
    /// Returns the superseded subscription so the caller can delete it at the
    /// provider. Installing a subscription whose channel is already the active
    /// one returns `None`, which makes repeated calls harmless.
    pub fn on_renewed(&mut self, new: Subscription) -> Option<Subscription> {
        match self.state.take() {
            Some(old) if old.subscription.channel_id == new.channel_id => {
                self.state = Some(SubscriptionState::new(new));
                None
            }
            previous => {
                self.state = Some(SubscriptionState::new(new));
                previous.map(|s| s.subscription)
            }
        }
    }

    /// Records that the provider no longer honours the current channel.
    pub fn mark_invalid(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.invalidated = true;
        }
    }

    /// Forgets the subscription, returning it for provider-side deletion.
    pub fn clear(&mut self) -> Option<Subscription> {
        self.state.take().map(|s| s.subscription)
    }

    /// Whether a delivery on `channel_id` belongs to the current subscription.
    pub fn matches_channel(&self, channel_id: &str) -> bool {
        self.current()
            .map(|s| s.channel_id == channel_id)
            .unwrap_or(false)
    }
}
