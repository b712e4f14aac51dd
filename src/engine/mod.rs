//! Event source engine - per-source orchestration.
//!
//! Every operation is one read-modify-write cycle over a single source
//! instance's [`StoredState`]:
//!
//! ```text
//! trigger (tick | delivery | renewal check)
//!          ↓
//!   read StoredState ──→ ProviderClient (list / create / delete)
//!          ↓
//!   snapshot::diff | SubscriptionScheduler
//!          ↓
//!   EmitSink.emit(event) for each new item, in order
//!          ↓
//!   write StoredState (only after every emission succeeded)
//! ```
//!
//! # Serialization
//! Hosts are expected to run at most one invocation per source instance at a
//! time. The engine also takes a per-source lease around each operation, so
//! two overlapping triggers for the same source queue instead of clobbering
//! each other's baseline. Different sources never share state or leases.

use crate::config::{SourceConfig, SourceMode};
use crate::error::{EngineError, ProviderError};
use crate::event::{is_valid_source_id, EmitSink, Event};
use crate::provider::{ProviderClient, WebhookDelivery};
use crate::snapshot;
use crate::state::{StateStore, StoredState};
use crate::subscription::{RenewalDecision, RenewalPolicy, Subscription, SubscriptionScheduler};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};


const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one poll cycle (tick or accepted delivery).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    /// Number of events handed to the sink
    pub emitted: usize,
    /// True when this cycle only recorded the first baseline
    pub baseline_established: bool,
}

/// Why a webhook delivery was ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// The source has no active subscription (poll source or unregistered)
    NoSubscription,
    /// The delivery did not say which channel it came from
    MissingChannel,
    /// The delivery came from a channel other than the current one
    StaleChannel(String),
    /// Provider handshake/control message, not a change notification
    ControlMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Discarded(DiscardReason),
    Processed(TickOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenewalOutcome {
    NoAction,
    /// Replaced an active subscription inside its renewal window
    Renewed {
        old_channel_id: String,
        new_channel_id: String,
    },
    /// Registered a new subscription after expiry, invalidation or a failed
    /// activation
    Reactivated { channel_id: String },
}

/// Orchestrates change detection and subscription lifecycles for many
/// independent source instances.
pub struct EventSourceEngine {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EmitSink>,
    providers: HashMap<String, Arc<dyn ProviderClient>>,
    policy: RenewalPolicy,
    provider_timeout: Duration,
    leases: DashMap<String, Arc<Mutex<()>>>,
}

impl EventSourceEngine {
    pub fn new(store: Arc<dyn StateStore>, sink: Arc<dyn EmitSink>) -> Self {
        Self {
            store,
            sink,
            providers: HashMap::new(),
            policy: RenewalPolicy::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            leases: DashMap::new(),
        }
    }

    /// Registers a provider under its [`ProviderClient::name`].
    pub fn with_provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn policy(&self) -> RenewalPolicy {
        self.policy
    }

    /// Names of the registered providers, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Read-only view of a source's persisted state.
    pub fn state(&self, source_id: &str) -> Result<Option<StoredState>, EngineError> {
        Ok(self.store.get(source_id)?)
    }

    /// Ids of every activated source.
    pub fn source_ids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_ids()?)
    }

    /// Activates a source instance.
    ///
    /// Poll sources only persist their configuration; the first tick records
    /// the baseline. Webhook sources register a channel at the provider and
    /// record a best-effort baseline so the first delivery can be diffed.
    ///
    /// Activating an id that is already active replaces it: its baseline is
    /// discarded and its old channels are stopped once the replacement is
    /// persisted. If the replacement cannot be registered the previous
    /// registration stays in place untouched.
    ///
    /// Returns the new subscription for webhook sources.
    pub async fn activate(
        &self,
        source_id: &str,
        config: SourceConfig,
    ) -> Result<Option<Subscription>, EngineError> {
        let provider = self.validate_config(source_id, &config)?;
        self.with_lease(source_id, self.activate_locked(source_id, config, provider))
            .await
    }

    async fn activate_locked(
        &self,
        source_id: &str,
        config: SourceConfig,
        provider: Arc<dyn ProviderClient>,
    ) -> Result<Option<Subscription>, EngineError> {
        let previous = self.store.get(source_id)?;
        let mut state = StoredState::new(config.clone());

        let subscription = match &config.mode {
            SourceMode::Poll { .. } => None,
            SourceMode::Webhook {
                resource_id,
                callback_url,
            } => {
                let subscription = self
                    .create_subscription(provider.as_ref(), resource_id, callback_url, None)
                    .await?;

                match self
                    .call(provider.name(), None, provider.list_resources(&config.filter))
                    .await
                {
                    Ok(records) => {
                        let d = snapshot::diff(None, records, |r| provider.identity_of(r));
                        state.baseline = Some(d.current);
                    }
                    Err(e) => warn!(
                        source_id = %source_id,
                        error = %e,
                        "Initial listing failed; first delivery will record the baseline"
                    ),
                }

                let mut scheduler = SubscriptionScheduler::default();
                scheduler.on_renewed(subscription.clone());
                state.subscription = scheduler.into_state();
                Some(subscription)
            }
        };

        if let Err(e) = self.store.set(source_id, &state) {
            // Nothing references the new channel; stop it before giving up
            if let Some(subscription) = &subscription {
                self.stop_quietly(source_id, provider.as_ref(), subscription)
                    .await;
            }
            return Err(e.into());
        }

        if let Some(previous) = previous {
            info!(source_id = %source_id, "Re-activated source, tearing down previous registration");
            self.retire_previous(source_id, provider.as_ref(), &mut state, previous)
                .await;
        }

        match &subscription {
            Some(subscription) => info!(
                source_id = %source_id,
                provider = %config.provider,
                channel_id = %subscription.channel_id,
                expires_at = subscription.expires_at_epoch_millis,
                "Webhook source activated"
            ),
            None => info!(source_id = %source_id, provider = %config.provider, "Poll source activated"),
        }
        Ok(subscription)
    }

    /// Stops every channel of the source at the provider (best effort) and
    /// clears its persisted state.
    pub async fn deactivate(&self, source_id: &str) -> Result<(), EngineError> {
        self.with_lease(source_id, self.deactivate_locked(source_id))
            .await?;
        self.release_lease(source_id);
        Ok(())
    }

    async fn deactivate_locked(&self, source_id: &str) -> Result<(), EngineError> {
        let state = self.load(source_id)?;
        self.stop_all(source_id, &state).await;
        self.store.delete(source_id)?;

        info!(source_id = %source_id, "Source deactivated");
        Ok(())
    }

    /// Runs one poll cycle: list, diff against the baseline, emit, persist.
    ///
    /// The baseline only advances after every new item was emitted, so a
    /// failure part-way re-emits the whole batch on the next tick.
    pub async fn on_tick(&self, source_id: &str) -> Result<TickOutcome, EngineError> {
        self.with_lease(source_id, self.on_tick_locked(source_id))
            .await
    }

    async fn on_tick_locked(&self, source_id: &str) -> Result<TickOutcome, EngineError> {
        let mut state = self.load(source_id)?;
        let provider = self.provider(&state.config.provider)?;
        self.run_cycle(source_id, provider.as_ref(), &mut state, None)
            .await
    }

    /// Handles an inbound webhook call.
    ///
    /// Deliveries from any channel other than the current subscription's are
    /// discarded without touching state, as are provider control messages.
    pub async fn on_webhook_delivery(
        &self,
        source_id: &str,
        delivery: WebhookDelivery,
    ) -> Result<DeliveryOutcome, EngineError> {
        self.with_lease(source_id, self.on_webhook_delivery_locked(source_id, delivery))
            .await
    }

    async fn on_webhook_delivery_locked(
        &self,
        source_id: &str,
        delivery: WebhookDelivery,
    ) -> Result<DeliveryOutcome, EngineError> {
        let mut state = self.load(source_id)?;
        let provider = self.provider(&state.config.provider)?;

        let scheduler = SubscriptionScheduler::new(state.subscription.clone());
        if scheduler.current().is_none() {
            warn!(source_id = %source_id, "Delivery for source without subscription discarded");
            return Ok(DeliveryOutcome::Discarded(DiscardReason::NoSubscription));
        }

        let Some(channel_id) = provider.delivery_channel_id(&delivery) else {
            warn!(source_id = %source_id, "Delivery without channel id discarded");
            return Ok(DeliveryOutcome::Discarded(DiscardReason::MissingChannel));
        };

        if !scheduler.matches_channel(&channel_id) {
            warn!(
                source_id = %source_id,
                channel_id = %channel_id,
                "Delivery from stale channel discarded"
            );
            return Ok(DeliveryOutcome::Discarded(DiscardReason::StaleChannel(
                channel_id,
            )));
        }

        if !provider.accepts_delivery(&delivery) {
            debug!(source_id = %source_id, channel_id = %channel_id, "Control message ignored");
            return Ok(DeliveryOutcome::Discarded(DiscardReason::ControlMessage));
        }

        let outcome = self
            .run_cycle(source_id, provider.as_ref(), &mut state, Some(&channel_id))
            .await?;
        Ok(DeliveryOutcome::Processed(outcome))
    }

    /// Timer-driven renewal check for a webhook source.
    ///
    /// Also retries the deletion of superseded channels left behind by an
    /// earlier renewal. Poll sources always report `NoAction`.
    pub async fn on_renewal_check(
        &self,
        source_id: &str,
        now: i64,
    ) -> Result<RenewalOutcome, EngineError> {
        self.with_lease(source_id, self.on_renewal_check_locked(source_id, now))
            .await
    }

    async fn on_renewal_check_locked(
        &self,
        source_id: &str,
        now: i64,
    ) -> Result<RenewalOutcome, EngineError> {
        let mut state = self.load(source_id)?;
        let SourceMode::Webhook {
            resource_id,
            callback_url,
        } = state.config.mode.clone()
        else {
            return Ok(RenewalOutcome::NoAction);
        };
        let provider = self.provider(&state.config.provider)?;

        self.retry_retired(source_id, provider.as_ref(), &mut state)
            .await?;

        let mut scheduler = SubscriptionScheduler::new(state.subscription.clone());
        let decision = scheduler.check_and_renew(now);
        if decision == RenewalDecision::NoAction {
            return Ok(RenewalOutcome::NoAction);
        }

        let old_channel = scheduler.current().map(|s| s.channel_id.clone());
        let created = self
            .create_subscription(
                provider.as_ref(),
                &resource_id,
                &callback_url,
                old_channel.as_deref(),
            )
            .await;

        let new = match created {
            Ok(new) => new,
            Err(e @ EngineError::SubscriptionInvalid { .. }) => {
                scheduler.mark_invalid();
                state.subscription = scheduler.into_state();
                state.touch();
                self.store.set(source_id, &state)?;
                return Err(e);
            }
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "Subscription renewal failed, will retry");
                return Err(e);
            }
        };

        let superseded = scheduler.on_renewed(new.clone());
        state.subscription = scheduler.into_state();
        if let Some(old) = &superseded {
            state.retired.push(old.clone());
        }
        state.touch();

        if let Err(e) = self.store.set(source_id, &state) {
            self.stop_quietly(source_id, provider.as_ref(), &new).await;
            return Err(e.into());
        }

        if superseded.is_some() {
            self.retry_retired(source_id, provider.as_ref(), &mut state)
                .await?;
        }

        let outcome = match (decision, old_channel) {
            (RenewalDecision::RenewNow, Some(old_channel_id)) => RenewalOutcome::Renewed {
                old_channel_id,
                new_channel_id: new.channel_id.clone(),
            },
            _ => RenewalOutcome::Reactivated {
                channel_id: new.channel_id.clone(),
            },
        };

        info!(
            source_id = %source_id,
            channel_id = %new.channel_id,
            expires_at = new.expires_at_epoch_millis,
            outcome = ?outcome,
            "Subscription replaced"
        );
        Ok(outcome)
    }

    fn validate_config(
        &self,
        source_id: &str,
        config: &SourceConfig,
    ) -> Result<Arc<dyn ProviderClient>, EngineError> {
        if !is_valid_source_id(source_id) {
            return Err(EngineError::Configuration(format!(
                "invalid source id '{}'",
                source_id
            )));
        }

        let provider = self.provider(&config.provider)?;

        let missing = config.missing_filters(provider.required_filters());
        if !missing.is_empty() {
            return Err(EngineError::Configuration(format!(
                "{} requires filter(s): {}",
                config.provider,
                missing.join(", ")
            )));
        }

        match &config.mode {
            SourceMode::Poll { interval_secs: 0 } => Err(EngineError::Configuration(
                "poll interval must be positive".to_string(),
            )),
            SourceMode::Webhook { .. } if !provider.supports_webhooks() => {
                Err(EngineError::Configuration(format!(
                    "{} does not support webhook sources",
                    config.provider
                )))
            }
            SourceMode::Webhook {
                resource_id,
                callback_url,
            } if resource_id.is_empty() || callback_url.is_empty() => {
                Err(EngineError::Configuration(
                    "webhook sources need a resource_id and a callback_url".to_string(),
                ))
            }
            _ => Ok(provider),
        }
    }

    /// Shared list → diff → emit → persist cycle.
    async fn run_cycle(
        &self,
        source_id: &str,
        provider: &dyn ProviderClient,
        state: &mut StoredState,
        channel_id: Option<&str>,
    ) -> Result<TickOutcome, EngineError> {
        let listed = self
            .call(
                provider.name(),
                channel_id,
                provider.list_resources(&state.config.filter),
            )
            .await;

        let records = match listed {
            Ok(records) => records,
            Err(e @ EngineError::SubscriptionInvalid { .. }) => {
                if state.subscription.is_some() {
                    let mut scheduler = SubscriptionScheduler::new(state.subscription.take());
                    scheduler.mark_invalid();
                    state.subscription = scheduler.into_state();
                    state.touch();
                    self.store.set(source_id, state)?;
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let d = snapshot::diff(state.baseline.as_ref(), records, |r| {
            provider.identity_of(r)
        });
        let observed_at = Utc::now().timestamp_millis();

        // Validate the whole batch first; an invalid record must not be
        // skipped past by the baseline
        let events = d
            .new_items
            .iter()
            .map(|(identity, record)| {
                let event = Event::from_record(source_id, identity.clone(), record, observed_at);
                event
                    .validate()
                    .map(|()| event)
                    .map_err(|e| EngineError::InvalidEvent {
                        event_id: identity.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut emitted = 0;
        for event in &events {
            self.sink.emit(event).await?;
            emitted += 1;
        }

        state.baseline = Some(d.current);
        state.touch();
        self.store.set(source_id, state)?;

        if d.baseline_only {
            info!(
                source_id = %source_id,
                items = state.baseline.as_ref().map(|b| b.len()).unwrap_or(0),
                "Baseline recorded"
            );
        } else if emitted > 0 {
            info!(source_id = %source_id, event_count = emitted, "Emitted new events");
        } else {
            debug!(source_id = %source_id, "No new items");
        }

        Ok(TickOutcome {
            emitted,
            baseline_established: d.baseline_only,
        })
    }

    async fn create_subscription(
        &self,
        provider: &dyn ProviderClient,
        resource_id: &str,
        callback_url: &str,
        channel_id: Option<&str>,
    ) -> Result<Subscription, EngineError> {
        let created = self
            .call(
                provider.name(),
                channel_id,
                provider.create_subscription(resource_id, callback_url, self.policy.ttl()),
            )
            .await?;
        Ok(self.policy.apply(created, Utc::now().timestamp_millis()))
    }

    /// Deletes retired channels; keeps the ones the provider could not stop.
    async fn retry_retired(
        &self,
        source_id: &str,
        provider: &dyn ProviderClient,
        state: &mut StoredState,
    ) -> Result<(), EngineError> {
        if state.retired.is_empty() {
            return Ok(());
        }

        let mut remaining = Vec::new();
        for old in std::mem::take(&mut state.retired) {
            let stopped = self
                .call(
                    provider.name(),
                    Some(&old.channel_id),
                    provider.delete_subscription(&old),
                )
                .await;
            match stopped {
                // Already gone at the provider counts as stopped
                Ok(()) | Err(EngineError::SubscriptionInvalid { .. }) => {
                    debug!(source_id = %source_id, channel_id = %old.channel_id, "Retired channel stopped");
                }
                Err(e) => {
                    warn!(
                        source_id = %source_id,
                        channel_id = %old.channel_id,
                        error = %e,
                        "Failed to stop retired channel, will retry"
                    );
                    remaining.push(old);
                }
            }
        }

        state.retired = remaining;
        state.touch();
        self.store.set(source_id, state)?;
        Ok(())
    }

    async fn stop_all(&self, source_id: &str, state: &StoredState) {
        let provider = match self.provider(&state.config.provider) {
            Ok(p) => p,
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "Cannot stop channels");
                return;
            }
        };

        let channels = state
            .subscription
            .iter()
            .map(|s| &s.subscription)
            .chain(state.retired.iter());
        for subscription in channels {
            self.stop_quietly(source_id, provider.as_ref(), subscription)
                .await;
        }
    }

    async fn stop_quietly(
        &self,
        source_id: &str,
        provider: &dyn ProviderClient,
        subscription: &Subscription,
    ) {
        let result = self
            .call(
                provider.name(),
                Some(&subscription.channel_id),
                provider.delete_subscription(subscription),
            )
            .await;
        if let Err(e) = result {
            warn!(
                source_id = %source_id,
                channel_id = %subscription.channel_id,
                error = %e,
                "Failed to stop channel"
            );
        }
    }

    /// Bounds a provider call by the configured timeout and translates its error.
    async fn call<T, F>(
        &self,
        provider: &str,
        channel_id: Option<&str>,
        fut: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.provider_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::from_provider(provider, channel_id, e)),
            Err(_) => Err(EngineError::TransientProvider {
                provider: provider.to_string(),
                message: format!("timed out after {:?}", self.provider_timeout),
            }),
        }
    }

    fn provider(&self, name: &str) -> Result<Arc<dyn ProviderClient>, EngineError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("unknown provider '{}'", name)))
    }

    fn load(&self, source_id: &str) -> Result<StoredState, EngineError> {
        self.store
            .get(source_id)?
            .ok_or_else(|| EngineError::UnknownSource(source_id.to_string()))
    }

    fn lease(&self, source_id: &str) -> Arc<Mutex<()>> {
        let entry = self.leases.entry(source_id.to_string()).or_default();
        Arc::clone(entry.value())
    }

    /// Runs `op` while holding the source's lease.
    ///
    /// A failed invocation for an id with no persisted state drops the lease
    /// again, so unknown ids never accumulate entries.
    async fn with_lease<T, F>(&self, source_id: &str, op: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let lease = self.lease(source_id);
        let result = {
            let _guard = lease.lock().await;
            op.await
        };
        drop(lease);

        if result.is_err() {
            self.release_lease(source_id);
        }
        result
    }

    /// Drops the lease of a source without persisted state, unless another
    /// invocation still holds or waits on it.
    fn release_lease(&self, source_id: &str) {
        if matches!(self.store.get(source_id), Ok(None)) {
            self.leases
                .remove_if(source_id, |_, lease| Arc::strong_count(lease) == 1);
        }
    }

    /// Stops the channels of a registration that was just replaced.
    ///
    /// Channels of the same provider go through `retired`, so a stop that
    /// fails now is retried by later renewal checks. Channels of a different
    /// provider, or of a source that became a poll source, are stopped once.
    async fn retire_previous(
        &self,
        source_id: &str,
        provider: &dyn ProviderClient,
        state: &mut StoredState,
        previous: StoredState,
    ) {
        let same_provider = previous.config.provider == state.config.provider;
        if !(same_provider && state.config.is_webhook()) {
            self.stop_all(source_id, &previous).await;
            return;
        }

        state
            .retired
            .extend(previous.subscription.map(|s| s.subscription));
        state.retired.extend(previous.retired);
        if let Err(e) = self.retry_retired(source_id, provider, state).await {
            warn!(source_id = %source_id, error = %e, "Failed to record stopped channels");
        }
    }
}
