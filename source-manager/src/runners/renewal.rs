//! Periodic renewal sweep over webhook sources.

use super::RunnerStatus;
use chrono::Utc;
use pulse::{EngineError, EventSourceEngine, RenewalOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenewalSweep {
    /// Webhook sources examined
    pub checked: usize,
    /// Sources whose subscription was replaced or re-registered
    pub renewed: usize,
    /// Sources whose check failed (retried on the next sweep)
    pub failed: usize,
}

/// Calls `on_renewal_check` for every webhook source at a fixed cadence.
///
/// The cadence must be finer than the renewal margin, otherwise a channel can
/// expire between two sweeps; the host validates this at startup.
pub struct RenewalRunner {
    engine: Arc<EventSourceEngine>,
    interval: Duration,
    status: Arc<Mutex<RunnerStatus>>,
}

impl RenewalRunner {
    pub fn new(engine: Arc<EventSourceEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            status: Arc::new(Mutex::new(RunnerStatus::default())),
        }
    }

    pub fn status(&self) -> Arc<Mutex<RunnerStatus>> {
        Arc::clone(&self.status)
    }

    /// Checks every webhook source once at `now` (epoch ms).
    pub async fn sweep(&self, now: i64) -> Result<RenewalSweep, EngineError> {
        let mut sweep = RenewalSweep::default();

        for source_id in self.engine.source_ids()? {
            // Deactivated between listing and checking
            let Some(state) = self.engine.state(&source_id)? else {
                continue;
            };
            if !state.config.is_webhook() {
                continue;
            }

            sweep.checked += 1;
            match self.engine.on_renewal_check(&source_id, now).await {
                Ok(RenewalOutcome::NoAction) => {}
                Ok(outcome) => {
                    debug!(source_id = %source_id, outcome = ?outcome, "Subscription renewed");
                    sweep.renewed += 1;
                }
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "Renewal check failed");
                    sweep.failed += 1;
                }
            }
        }

        Ok(sweep)
    }

    /// Runs a sweep and records its outcome.
    pub async fn run_once(&self) -> Result<RenewalSweep, EngineError> {
        let result = self.sweep(Utc::now().timestamp_millis()).await;

        let mut status = self.status.lock().await;
        match &result {
            Ok(sweep) if sweep.failed == 0 => status.record_success(),
            Ok(sweep) => status.record_error(format!(
                "{} of {} renewal checks failed",
                sweep.failed, sweep.checked
            )),
            Err(e) => status.record_error(e),
        }
        result
    }

    /// Starts the sweep loop (non-blocking).
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Starting renewal runner");

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Renewal sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_engine;
    use pulse::SourceConfig;

    const CALLBACK: &str = "http://localhost:3001/webhooks/gcal";

    #[tokio::test]
    async fn test_sweep_renews_due_webhook_sources_only() {
        let t = test_engine(&[]);
        t.engine
            .activate("gcal", SourceConfig::webhook("static", "primary", CALLBACK))
            .await
            .unwrap();
        t.engine
            .activate("tables", SourceConfig::poll("static", 60))
            .await
            .unwrap();
        let runner = RenewalRunner::new(t.engine.clone(), Duration::from_secs(300));

        let now = Utc::now().timestamp_millis();
        assert_eq!(
            runner.sweep(now).await.unwrap(),
            RenewalSweep {
                checked: 1,
                renewed: 0,
                failed: 0
            }
        );

        // Inside the renewal window
        let due = now + 86_400_000 - 60_000;
        assert_eq!(
            runner.sweep(due).await.unwrap(),
            RenewalSweep {
                checked: 1,
                renewed: 1,
                failed: 0
            }
        );
        assert_eq!(t.provider.deleted(), vec!["chan-1"]);
    }

    #[tokio::test]
    async fn test_run_once_records_success() {
        let t = test_engine(&[]);
        let runner = RenewalRunner::new(t.engine.clone(), Duration::from_secs(300));

        assert_eq!(runner.run_once().await.unwrap(), RenewalSweep::default());
        let status = runner.status();
        assert_eq!(status.lock().await.run_count, 1);
    }
}
