//! Source Manager HTTP API.
//!
//! Exposes four routes:
//! - `GET /api/sources` - list active sources with subscription and runner status
//! - `POST /api/sources` - activate (or re-activate) a source
//! - `DELETE /api/sources/:source_id` - deactivate a source
//! - `POST /webhooks/:source_id` - provider push notifications

use crate::manager::{SourceInfo, SourceManager};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use pulse::{
    DeliveryOutcome, DiscardReason, EngineError, ResourceFilter, SourceConfig, SourceMode,
    WebhookDelivery,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<SourceManager>,
}

/// Mode as received in the request body.
///
/// `callback_url` may be omitted for webhook sources; the manager then
/// registers its own `/webhooks/:source_id` endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModeInput {
    Poll {
        interval_secs: u64,
    },
    Webhook {
        resource_id: String,
        callback_url: Option<String>,
    },
}

/// Request body for `POST /api/sources`.
#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    /// Generated when absent
    pub source_id: Option<String>,
    pub provider: String,
    pub mode: ModeInput,
    #[serde(default)]
    pub filter: ResourceFilter,
}

/// Response for `POST /api/sources`.
#[derive(Debug, Serialize)]
pub struct CreateSourceResponse {
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Response for `POST /webhooks/:source_id`.
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub emitted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ---------------------------------------------------------------------------
// Business logic (called from HTTP handlers and unit tests)
// ---------------------------------------------------------------------------

/// Activates a source from an API request.
pub async fn handle_create_source(
    state: &ApiState,
    req: CreateSourceRequest,
) -> Result<CreateSourceResponse, EngineError> {
    let source_id = req
        .source_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mode = match req.mode {
        ModeInput::Poll { interval_secs } => SourceMode::Poll { interval_secs },
        ModeInput::Webhook {
            resource_id,
            callback_url,
        } => SourceMode::Webhook {
            resource_id,
            callback_url: callback_url.unwrap_or_else(|| state.manager.callback_url(&source_id)),
        },
    };
    let config = SourceConfig {
        provider: req.provider,
        mode,
        filter: req.filter,
    };

    let subscription = state.manager.activate(&source_id, config).await?;

    info!(source_id = %source_id, "Source activated via API");
    Ok(CreateSourceResponse {
        source_id,
        channel_id: subscription.as_ref().map(|s| s.channel_id.clone()),
        expires_at: subscription.map(|s| s.expires_at_epoch_millis),
    })
}

pub async fn handle_delete_source(state: &ApiState, source_id: &str) -> Result<(), EngineError> {
    state.manager.deactivate(source_id).await?;
    info!(source_id = %source_id, "Source deactivated via API");
    Ok(())
}

/// Hands a push notification to the engine.
///
/// Discarded deliveries are still acknowledged; a provider that sees errors
/// would keep redelivering a notification nobody wants.
pub async fn handle_webhook(
    state: &ApiState,
    source_id: &str,
    delivery: WebhookDelivery,
) -> Result<WebhookResponse, EngineError> {
    match state.manager.deliver(source_id, delivery).await? {
        DeliveryOutcome::Processed(outcome) => Ok(WebhookResponse {
            status: "processed",
            emitted: outcome.emitted,
            reason: None,
        }),
        DeliveryOutcome::Discarded(reason) => {
            debug!(source_id = %source_id, reason = ?reason, "Webhook delivery discarded");
            Ok(WebhookResponse {
                status: "discarded",
                emitted: 0,
                reason: Some(discard_reason(&reason)),
            })
        }
    }
}

fn discard_reason(reason: &DiscardReason) -> String {
    match reason {
        DiscardReason::NoSubscription => "no_subscription".to_string(),
        DiscardReason::MissingChannel => "missing_channel".to_string(),
        DiscardReason::StaleChannel(channel) => format!("stale_channel:{}", channel),
        DiscardReason::ControlMessage => "control_message".to_string(),
    }
}

/// Builds a delivery from raw request parts. An empty or non-JSON body
/// becomes `null`; providers like Google put everything in headers.
pub fn delivery_from_parts(headers: &HeaderMap, body: &[u8]) -> WebhookDelivery {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or_else(|e| {
            debug!(error = %e, "Webhook body is not JSON, ignoring it");
            Value::Null
        })
    };

    WebhookDelivery { headers, body }
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn list_sources(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<SourceInfo>>, AppError> {
    let sources = state.manager.list().await?;
    Ok(Json(sources))
}

async fn post_source(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateSourceRequest>,
) -> Result<(StatusCode, Json<CreateSourceResponse>), AppError> {
    let response = handle_create_source(&state, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn delete_source(
    State(state): State<Arc<ApiState>>,
    Path(source_id): Path<String>,
) -> Result<StatusCode, AppError> {
    handle_delete_source(&state, &source_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_webhook(
    State(state): State<Arc<ApiState>>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let delivery = delivery_from_parts(&headers, &body);
    let response = handle_webhook(&state, &source_id, delivery).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

struct AppError {
    status: StatusCode,
    message: String,
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Configuration(_) => StatusCode::BAD_REQUEST,
            EngineError::UnknownSource(_) => StatusCode::NOT_FOUND,
            EngineError::TransientProvider { .. }
            | EngineError::SubscriptionInvalid { .. }
            | EngineError::InvalidEvent { .. } => StatusCode::BAD_GATEWAY,
            EngineError::StateStore(_) | EngineError::Emit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %e, "Request failed");
        }
        AppError {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources).post(post_source))
        .route("/api/sources/:source_id", delete(delete_source))
        .route("/webhooks/:source_id", post(post_webhook))
        .with_state(Arc::new(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_engine, TestEngine};
    use axum::http::HeaderValue;
    use pulse::config::ApiConfig;
    use std::time::Duration;

    fn make_state(ids: &[&str]) -> (ApiState, TestEngine) {
        let t = test_engine(ids);
        let manager = SourceManager::new(
            t.engine.clone(),
            ApiConfig {
                port: 3001,
                public_url: "https://hooks.example.com".to_string(),
            },
            Duration::from_secs(300),
        );
        (
            ApiState {
                manager: Arc::new(manager),
            },
            t,
        )
    }

    fn webhook_request(source_id: &str) -> CreateSourceRequest {
        CreateSourceRequest {
            source_id: Some(source_id.to_string()),
            provider: "static".to_string(),
            mode: ModeInput::Webhook {
                resource_id: "primary".to_string(),
                callback_url: None,
            },
            filter: ResourceFilter::new(),
        }
    }

    fn delivery(channel_id: &str) -> WebhookDelivery {
        let mut headers = HeaderMap::new();
        headers.insert("X-Channel-ID", HeaderValue::from_str(channel_id).unwrap());
        delivery_from_parts(&headers, b"")
    }

    #[tokio::test]
    async fn test_create_webhook_source_uses_own_callback() {
        let (state, t) = make_state(&["e1"]);
        let response = handle_create_source(&state, webhook_request("gcal"))
            .await
            .unwrap();

        assert_eq!(response.source_id, "gcal");
        assert_eq!(response.channel_id.as_deref(), Some("chan-1"));
        assert!(response.expires_at.is_some());

        let stored = t.engine.state("gcal").unwrap().unwrap();
        assert_eq!(
            stored.config.mode,
            SourceMode::Webhook {
                resource_id: "primary".to_string(),
                callback_url: "https://hooks.example.com/webhooks/gcal".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_create_poll_source_generates_id() {
        let (state, t) = make_state(&[]);
        let response = handle_create_source(
            &state,
            CreateSourceRequest {
                source_id: None,
                provider: "static".to_string(),
                mode: ModeInput::Poll { interval_secs: 60 },
                filter: ResourceFilter::new(),
            },
        )
        .await
        .unwrap();

        assert!(uuid::Uuid::parse_str(&response.source_id).is_ok());
        assert!(response.channel_id.is_none());
        assert!(t.engine.state(&response.source_id).unwrap().is_some());

        handle_delete_source(&state, &response.source_id)
            .await
            .unwrap();
        assert!(t.engine.state(&response.source_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_webhook_processes_current_channel() {
        let (state, t) = make_state(&["e1"]);
        handle_create_source(&state, webhook_request("gcal"))
            .await
            .unwrap();

        t.provider.set_listing(&["e1", "e2"]);
        let response = handle_webhook(&state, "gcal", delivery("chan-1"))
            .await
            .unwrap();
        assert_eq!(
            response,
            WebhookResponse {
                status: "processed",
                emitted: 1,
                reason: None,
            }
        );
        assert_eq!(t.sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_stale_channel_discarded() {
        let (state, t) = make_state(&["e1"]);
        handle_create_source(&state, webhook_request("gcal"))
            .await
            .unwrap();

        t.provider.set_listing(&["e1", "e2"]);
        let response = handle_webhook(&state, "gcal", delivery("chan-old"))
            .await
            .unwrap();
        assert_eq!(response.status, "discarded");
        assert_eq!(response.reason.as_deref(), Some("stale_channel:chan-old"));
        assert!(t.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_unknown_source() {
        let (state, _t) = make_state(&[]);
        let err = handle_webhook(&state, "nope", delivery("chan-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSource(_)));
        assert_eq!(AppError::from(err).status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_delivery_from_parts() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Goog-Channel-ID", HeaderValue::from_static("chan-1"));

        let delivery = delivery_from_parts(&headers, br#"{"kind":"change"}"#);
        assert_eq!(delivery.header("x-goog-channel-id"), Some("chan-1"));
        assert_eq!(delivery.body["kind"], "change");

        let delivery = delivery_from_parts(&headers, b"not json");
        assert_eq!(delivery.body, Value::Null);
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: EngineError| AppError::from(e).status;
        assert_eq!(
            status(EngineError::Configuration("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(EngineError::TransientProvider {
                provider: "static".into(),
                message: "timeout".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(EngineError::Emit(pulse::EmitError("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
