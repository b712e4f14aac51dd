//! Snapshot capture and diffing.
//!
//! A snapshot is the ordered list of resource identities a provider reported
//! at one point in time. Each poll supersedes the previous snapshot wholesale;
//! the difference between the two is what gets emitted.

use crate::provider::ResourceRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;


/// Identities observed for one source instance at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version (for future schema evolution)
    pub snapshot_version: String,

    /// When the underlying listing was taken
    pub captured_at: DateTime<Utc>,

    /// Identities in provider order
    pub identities: Vec<String>,
}

impl Snapshot {
    pub fn new(identities: Vec<String>) -> Self {
        Self {
            snapshot_version: "1".to_string(),
            captured_at: Utc::now(),
            identities,
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities.iter().any(|i| i == identity)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Result of comparing the current listing against the stored baseline.
#[derive(Clone, Debug)]
pub struct Diff {
    /// New records paired with their identity, in `current` order
    pub new_items: Vec<(String, ResourceRecord)>,

    /// Snapshot of the full current listing; the next baseline
    pub current: Snapshot,

    /// True when there was no previous baseline and nothing was reported new
    pub baseline_only: bool,
}

/// Computes the records in `current` whose identity is absent from `previous`.
///
/// First-run policy is *baseline*: when `previous` is `None` the current
/// listing only becomes the baseline and nothing is reported new. An empty
/// (but present) previous snapshot is a real baseline, so everything in
/// `current` is new.
///
/// Order of `current` is preserved. An identity repeated within `current`
/// is reported once.
pub fn diff<F>(previous: Option<&Snapshot>, current: Vec<ResourceRecord>, identity_of: F) -> Diff
where
    F: Fn(&ResourceRecord) -> String,
{
    let keyed: Vec<(String, ResourceRecord)> = current
        .into_iter()
        .map(|record| (identity_of(&record), record))
        .collect();
    let snapshot = Snapshot::new(keyed.iter().map(|(id, _)| id.clone()).collect());

    let Some(previous) = previous else {
        return Diff {
            new_items: Vec::new(),
            current: snapshot,
            baseline_only: true,
        };
    };

    let known: HashSet<&str> = previous.identities.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let new_items = keyed
        .into_iter()
        .filter(|(id, _)| !known.contains(id.as_str()) && seen.insert(id.clone()))
        .collect();

    Diff {
        new_items,
        current: snapshot,
        baseline_only: false,
    }
}
