//! Downstream event sinks.

use async_trait::async_trait;
use pulse::{EmitError, EmitSink, Event};
use tracing::{debug, info};

/// POSTs each event as JSON to a downstream endpoint.
///
/// Any non-2xx answer is an emit failure, which keeps the source's baseline
/// where it was so the event is re-emitted on the next cycle.
pub struct HttpEmitSink {
    url: String,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpEmitSink {
    pub fn new(url: String, token: Option<String>) -> Self {
        Self {
            url,
            token,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmitSink for HttpEmitSink {
    async fn emit(&self, event: &Event) -> Result<(), EmitError> {
        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(event);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmitError(format!("failed to send event {}: {}", event.id, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(EmitError(format!(
                "sink returned error status {}: {}",
                status, body
            )));
        }

        debug!(source = %event.source, event_id = %event.id, "Event delivered to sink");
        Ok(())
    }
}

/// Writes events to the log. Used when no sink URL is configured.
#[derive(Default)]
pub struct LogSink;

#[async_trait]
impl EmitSink for LogSink {
    async fn emit(&self, event: &Event) -> Result<(), EmitError> {
        info!(
            source = %event.source,
            event_id = %event.id,
            timestamp = event.timestamp,
            summary = %event.summary,
            "Event"
        );
        Ok(())
    }
}
