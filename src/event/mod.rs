use crate::error::EmitError;
use crate::provider::ResourceRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

mod validation;

pub use validation::{is_valid_source_id, validate, ValidationError};

/// A discrete event emitted by a source instance.
///
/// `id` is the downstream dedup key: re-emitting the same `id` is treated as a
/// duplicate by consumers, so it is derived deterministically from the
/// resource identity and never from wall-clock time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable, unique per logical occurrence
    pub id: String,

    /// Source instance that produced the event
    pub source: String,

    /// Human-readable one-liner (e.g. "New table: orders")
    pub summary: String,

    /// Unix epoch milliseconds
    pub timestamp: i64,

    /// The resource record as returned by the provider
    pub payload: Value,
}

impl Event {
    /// Builds the event for a newly observed resource.
    ///
    /// The record's own timestamp wins; `observed_at` is used when the
    /// provider does not report one or reports a pre-epoch time.
    pub fn from_record(
        source: &str,
        identity: String,
        record: &ResourceRecord,
        observed_at: i64,
    ) -> Self {
        Self {
            id: identity,
            source: source.to_string(),
            summary: record.summary.clone(),
            timestamp: record.timestamp.filter(|ts| *ts > 0).unwrap_or(observed_at),
            payload: record.data.clone(),
        }
    }

    /// Checks the envelope before it is handed to a sink.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}

/// Hands discrete events to the host pipeline.
///
/// Downstream consumers dedup on [`Event::id`], so sinks only need
/// at-least-once delivery.
#[async_trait]
pub trait EmitSink: Send + Sync {
    async fn emit(&self, event: &Event) -> Result<(), EmitError>;
}

/// Sink that keeps every emitted event in memory.
///
/// Useful for debugging a source and as a test double.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far, in emission order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Returns just the ids, in emission order.
    pub fn ids(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.id.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EmitSink for MemorySink {
    async fn emit(&self, event: &Event) -> Result<(), EmitError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
