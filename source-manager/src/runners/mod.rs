//! Timer-driven invocation of the engine.
//!
//! - [`poll::PollRunner`]: one per poll source, ticks at the source's interval
//! - [`renewal::RenewalRunner`]: one per host, sweeps every webhook source

pub mod poll;
pub mod renewal;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Status information for a runner.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunnerStatus {
    /// Last successful run timestamp
    pub last_run: Option<DateTime<Utc>>,
    /// Last error message (cleared by the next success)
    pub last_error: Option<String>,
    /// Total number of successful runs
    pub run_count: u64,
    /// Total number of failed runs
    pub error_count: u64,
}

impl RunnerStatus {
    pub fn record_success(&mut self) {
        self.last_run = Some(Utc::now());
        self.last_error = None;
        self.run_count += 1;
    }

    pub fn record_error(&mut self, error: impl ToString) {
        self.last_error = Some(error.to_string());
        self.error_count += 1;
    }
}
