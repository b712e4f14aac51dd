//! Per-source polling loop.

use super::RunnerStatus;
use pulse::{EngineError, EventSourceEngine, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Drives `on_tick` for one poll source.
///
/// A failed tick is only recorded; the engine left the baseline untouched,
/// so the next tick retries the same batch.
pub struct PollRunner {
    source_id: String,
    engine: Arc<EventSourceEngine>,
    interval: Duration,
    status: Arc<Mutex<RunnerStatus>>,
}

impl PollRunner {
    pub fn new(source_id: String, engine: Arc<EventSourceEngine>, interval: Duration) -> Self {
        Self {
            source_id,
            engine,
            interval,
            status: Arc::new(Mutex::new(RunnerStatus::default())),
        }
    }

    /// Returns a clone of the status tracker for external monitoring.
    pub fn status(&self) -> Arc<Mutex<RunnerStatus>> {
        Arc::clone(&self.status)
    }

    /// Runs a single tick and records its outcome.
    pub async fn run_once(&self) -> Result<TickOutcome, EngineError> {
        let result = self.engine.on_tick(&self.source_id).await;

        let mut status = self.status.lock().await;
        match &result {
            Ok(outcome) => {
                debug!(
                    source_id = %self.source_id,
                    emitted = outcome.emitted,
                    baseline = outcome.baseline_established,
                    "Poll complete"
                );
                status.record_success();
            }
            Err(e) => status.record_error(e),
        }
        result
    }

    /// Starts the polling loop (non-blocking).
    ///
    /// The first tick fires immediately. The loop ends on its own once the
    /// source is deactivated or its configuration stops being usable.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                source_id = %self.source_id,
                interval_secs = self.interval.as_secs(),
                "Starting poll runner"
            );

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.run_once().await {
                    Ok(_) => {}
                    Err(EngineError::UnknownSource(_)) => {
                        info!(source_id = %self.source_id, "Source gone, stopping poll runner");
                        break;
                    }
                    Err(e @ EngineError::Configuration(_)) => {
                        error!(source_id = %self.source_id, error = %e, "Poll runner stopped");
                        break;
                    }
                    Err(e) => {
                        warn!(source_id = %self.source_id, error = %e, "Poll failed, will retry next tick");
                    }
                }
            }
        })
    }
}
