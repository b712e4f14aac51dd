use super::{StateStore, StoredState};
use crate::error::StoreError;
use dashmap::DashMap;

/// In-memory state store. Resets on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    states: DashMap<String, StoredState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, source_id: &str) -> Result<Option<StoredState>, StoreError> {
        Ok(self.states.get(source_id).map(|s| s.value().clone()))
    }

    fn set(&self, source_id: &str, state: &StoredState) -> Result<(), StoreError> {
        self.states.insert(source_id.to_string(), state.clone());
        Ok(())
    }

    fn delete(&self, source_id: &str) -> Result<(), StoreError> {
        self.states.remove(source_id);
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.states.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
