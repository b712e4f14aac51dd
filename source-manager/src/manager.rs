//! Source manager - owns the runners around a shared engine.
//!
//! The engine persists every activated source, so on startup the manager
//! resumes poll runners straight from the state store; webhook sources need
//! nothing but the renewal runner and the webhook endpoint.

use crate::runners::poll::PollRunner;
use crate::runners::renewal::RenewalRunner;
use crate::runners::RunnerStatus;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pulse::config::ApiConfig;
use pulse::{
    DeliveryOutcome, EngineError, EventSourceEngine, ResourceFilter, SourceConfig, SourceMode,
    StoredState, Subscription, SubscriptionPhase, SubscriptionScheduler, WebhookDelivery,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// Summary of one source for the management API.
#[derive(Clone, Debug, Serialize)]
pub struct SourceInfo {
    pub source_id: String,
    pub provider: String,
    pub mode: SourceMode,
    pub filter: ResourceFilter,
    /// Subscription phase, for webhook sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SubscriptionPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Items in the current baseline; absent until the first listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_size: Option<usize>,
    pub updated_at: DateTime<Utc>,
    /// Poll runner status, for poll sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerStatus>,
}

impl SourceInfo {
    fn new(source_id: String, state: StoredState, now: i64, runner: Option<RunnerStatus>) -> Self {
        let phase = state
            .config
            .is_webhook()
            .then(|| SubscriptionScheduler::new(state.subscription.clone()).phase(now));
        let current = state.subscription.map(|s| s.subscription);

        Self {
            source_id,
            provider: state.config.provider,
            mode: state.config.mode,
            filter: state.config.filter,
            phase,
            channel_id: current.as_ref().map(|s| s.channel_id.clone()),
            expires_at: current.as_ref().map(|s| s.expires_at_epoch_millis),
            baseline_size: state.baseline.map(|b| b.len()),
            updated_at: state.updated_at,
            runner,
        }
    }
}

type StatusMap = HashMap<String, Arc<Mutex<RunnerStatus>>>;

/// Orchestrates runners for every active source.
///
/// # Responsibilities
/// - Resume poll runners for persisted sources
/// - Run the renewal sweep for webhook sources
/// - Activate/deactivate sources on request
/// - Graceful shutdown
pub struct SourceManager {
    engine: Arc<EventSourceEngine>,
    api_config: ApiConfig,
    renewal_interval: Duration,
    /// Per-source poll runner handles
    poll_handles: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Status per poll source
    status_map: Mutex<StatusMap>,
    renewal: Mutex<Option<(JoinHandle<()>, Arc<Mutex<RunnerStatus>>)>>,
}

impl SourceManager {
    pub fn new(
        engine: Arc<EventSourceEngine>,
        api_config: ApiConfig,
        renewal_interval: Duration,
    ) -> Self {
        Self {
            engine,
            api_config,
            renewal_interval,
            poll_handles: Mutex::new(HashMap::new()),
            status_map: Mutex::new(HashMap::new()),
            renewal: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<EventSourceEngine> {
        &self.engine
    }

    /// Callback URL a webhook source should register.
    pub fn callback_url(&self, source_id: &str) -> String {
        self.api_config.callback_url(source_id)
    }

    /// Resumes persisted sources and starts the renewal runner.
    ///
    /// # Returns
    /// Number of sources found in the state store
    pub async fn start(&self) -> Result<usize> {
        let source_ids = self
            .engine
            .source_ids()
            .context("Failed to list persisted sources")?;

        for source_id in &source_ids {
            let state = self
                .engine
                .state(source_id)
                .with_context(|| format!("Failed to load source '{}'", source_id))?;
            if let Some(interval_secs) = state.and_then(|s| s.config.poll_interval_secs()) {
                self.start_poll_runner(source_id, interval_secs).await;
            }
        }

        let runner = RenewalRunner::new(Arc::clone(&self.engine), self.renewal_interval);
        let status = runner.status();
        let handle = runner.start();
        if let Some((old, _)) = self.renewal.lock().await.replace((handle, status)) {
            old.abort();
        }

        info!(sources = source_ids.len(), "Source manager started");
        Ok(source_ids.len())
    }

    /// Activates a source and starts its poll runner if it is a poll source.
    pub async fn activate(
        &self,
        source_id: &str,
        config: SourceConfig,
    ) -> Result<Option<Subscription>, EngineError> {
        let interval_secs = config.poll_interval_secs();
        let subscription = self.engine.activate(source_id, config).await?;

        match interval_secs {
            Some(secs) => self.start_poll_runner(source_id, secs).await,
            None => self.stop_poll_runner(source_id).await,
        }
        Ok(subscription)
    }

    /// Stops the source's runner and deactivates it in the engine.
    pub async fn deactivate(&self, source_id: &str) -> Result<(), EngineError> {
        self.stop_poll_runner(source_id).await;
        self.engine.deactivate(source_id).await
    }

    pub async fn deliver(
        &self,
        source_id: &str,
        delivery: WebhookDelivery,
    ) -> Result<DeliveryOutcome, EngineError> {
        self.engine.on_webhook_delivery(source_id, delivery).await
    }

    /// Every active source with its runner status.
    pub async fn list(&self) -> Result<Vec<SourceInfo>, EngineError> {
        let now = Utc::now().timestamp_millis();
        let statuses = self.status_map.lock().await.clone();

        let mut sources = Vec::new();
        for source_id in self.engine.source_ids()? {
            let Some(state) = self.engine.state(&source_id)? else {
                continue;
            };
            let runner = match statuses.get(&source_id) {
                Some(status) => Some(status.lock().await.clone()),
                None => None,
            };
            sources.push(SourceInfo::new(source_id, state, now, runner));
        }
        Ok(sources)
    }

    pub async fn renewal_status(&self) -> Option<RunnerStatus> {
        let status = self.renewal.lock().await.as_ref().map(|(_, s)| Arc::clone(s))?;
        let snapshot = status.lock().await.clone();
        Some(snapshot)
    }

    /// Starts (or restarts) the poll runner of a source.
    async fn start_poll_runner(&self, source_id: &str, interval_secs: u64) {
        let runner = PollRunner::new(
            source_id.to_string(),
            Arc::clone(&self.engine),
            Duration::from_secs(interval_secs),
        );
        let status = runner.status();
        let handle = runner.start();

        // Abort existing runner for this source if any, then track new handle
        if let Some(old) = self
            .poll_handles
            .lock()
            .await
            .insert(source_id.to_string(), handle)
        {
            old.abort();
            info!(source_id = %source_id, "Aborted existing poll runner before restart");
        }
        self.status_map
            .lock()
            .await
            .insert(source_id.to_string(), status);
    }

    async fn stop_poll_runner(&self, source_id: &str) {
        if let Some(handle) = self.poll_handles.lock().await.remove(source_id) {
            handle.abort();
            info!(source_id = %source_id, "Poll runner stopped");
        }
        self.status_map.lock().await.remove(source_id);
    }

    /// Aborts every runner. Persisted state is kept for the next start.
    pub async fn shutdown(&self) {
        info!("Shutting down source manager");

        for (source_id, handle) in self.poll_handles.lock().await.drain() {
            handle.abort();
            info!(source_id = %source_id, "Poll runner aborted");
        }
        self.status_map.lock().await.clear();

        if let Some((handle, _)) = self.renewal.lock().await.take() {
            handle.abort();
        }

        info!("Source manager shutdown complete");
    }

    #[cfg(test)]
    async fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.poll_handles.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
