//! Durable per-source state.
//!
//! Each source instance owns exactly one [`StoredState`] value under its id.
//! Writes replace the whole value in one atomic step, so a concurrent reader
//! (a status query, say) sees either the old or the new state, never a mix.

use crate::config::SourceConfig;
use crate::error::StoreError;
use crate::snapshot::Snapshot;
use crate::subscription::{Subscription, SubscriptionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

/// Everything the engine persists for one source instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    /// Configuration the source was activated with
    pub config: SourceConfig,

    /// Dedup baseline; `None` until the first successful listing
    #[serde(default)]
    pub baseline: Option<Snapshot>,

    /// Active webhook subscription (webhook sources only)
    #[serde(default)]
    pub subscription: Option<SubscriptionState>,

    /// Superseded subscriptions whose provider-side deletion is still pending
    #[serde(default)]
    pub retired: Vec<Subscription>,

    pub updated_at: DateTime<Utc>,
}

impl StoredState {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            baseline: None,
            subscription: None,
            retired: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Marks the value as freshly written.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Key/value persistence contract for source state.
///
/// `set` must be atomic per key. The engine never issues two concurrent
/// read-modify-write cycles for the same key.
pub trait StateStore: Send + Sync {
    fn get(&self, source_id: &str) -> Result<Option<StoredState>, StoreError>;

    fn set(&self, source_id: &str, state: &StoredState) -> Result<(), StoreError>;

    /// Removes the key. No-op if it does not exist.
    fn delete(&self, source_id: &str) -> Result<(), StoreError>;

    /// Ids of every persisted source, sorted.
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}
