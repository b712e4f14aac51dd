//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::Utc;
use pulse::{
    EventSourceEngine, MemorySink, MemoryStateStore, ProviderClient, ProviderError,
    ResourceFilter, ResourceRecord, Subscription,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider whose listing is set by the test.
pub struct StaticProvider {
    listing: Mutex<Vec<String>>,
    created: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl StaticProvider {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            listing: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            created: AtomicUsize::new(0),
            deleted: Mutex::new(vec![]),
        }
    }

    pub fn set_listing(&self, ids: &[&str]) {
        *self.listing.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn supports_webhooks(&self) -> bool {
        true
    }

    async fn list_resources(
        &self,
        _filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let ids = self.listing.lock().unwrap().clone();
        Ok(ids
            .into_iter()
            .map(|id| ResourceRecord {
                summary: format!("New item: {}", id),
                data: json!({ "id": id }),
                id,
                timestamp: None,
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        resource_id: &str,
        _callback_url: &str,
        ttl: Duration,
    ) -> Result<Subscription, ProviderError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Subscription::new(
            format!("chan-{}", n),
            resource_id.to_string(),
            Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        ))
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), ProviderError> {
        self.deleted
            .lock()
            .unwrap()
            .push(subscription.channel_id.clone());
        Ok(())
    }
}

pub struct TestEngine {
    pub engine: Arc<EventSourceEngine>,
    pub provider: Arc<StaticProvider>,
    pub sink: Arc<MemorySink>,
}

pub fn test_engine(ids: &[&str]) -> TestEngine {
    let provider = Arc::new(StaticProvider::new(ids));
    let sink = Arc::new(MemorySink::new());
    let engine = EventSourceEngine::new(Arc::new(MemoryStateStore::new()), sink.clone())
        .with_provider(provider.clone());
    TestEngine {
        engine: Arc::new(engine),
        provider,
        sink,
    }
}
