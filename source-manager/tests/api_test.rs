// Integration tests for /api/sources and /webhooks/:source_id

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use pulse::config::ApiConfig;
use pulse::{
    EventSourceEngine, MemorySink, MemoryStateStore, ProviderClient, ProviderError,
    ResourceFilter, ResourceRecord, Subscription,
};
use serde_json::{json, Value};
use source_manager::api::{create_router, ApiState};
use source_manager::SourceManager;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Calendar-like provider: one channel per subscription, listing set by the test.
struct FakeCalendar {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl ProviderClient for FakeCalendar {
    fn name(&self) -> &str {
        "calendar"
    }

    fn supports_webhooks(&self) -> bool {
        true
    }

    async fn list_resources(
        &self,
        _filter: &ResourceFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|id| ResourceRecord {
                id: id.clone(),
                summary: format!("New event: {}", id),
                timestamp: None,
                data: json!({ "id": id }),
            })
            .collect())
    }

    async fn create_subscription(
        &self,
        resource_id: &str,
        _callback_url: &str,
        ttl: Duration,
    ) -> Result<Subscription, ProviderError> {
        Ok(Subscription::new(
            "channel-1".to_string(),
            resource_id.to_string(),
            Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        ))
    }

    async fn delete_subscription(&self, _subscription: &Subscription) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    provider: Arc<FakeCalendar>,
    sink: Arc<MemorySink>,
}

fn create_test_app(events: &[&str]) -> TestApp {
    let provider = Arc::new(FakeCalendar {
        events: Mutex::new(events.iter().map(|s| s.to_string()).collect()),
    });
    let sink = Arc::new(MemorySink::new());
    let engine = EventSourceEngine::new(Arc::new(MemoryStateStore::new()), sink.clone())
        .with_provider(provider.clone());
    let manager = SourceManager::new(
        Arc::new(engine),
        ApiConfig::default(),
        Duration::from_secs(300),
    );
    TestApp {
        router: create_router(ApiState {
            manager: Arc::new(manager),
        }),
        provider,
        sink,
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn create_calendar_source() -> Request<Body> {
    json_request(
        "POST",
        "/api/sources",
        json!({
            "source_id": "team-calendar",
            "provider": "calendar",
            "mode": { "type": "webhook", "resource_id": "team@example.com" }
        }),
    )
}

/// POST /api/sources registers a channel and GET lists the source.
#[tokio::test]
async fn test_create_and_list_webhook_source() {
    let app = create_test_app(&["e1"]);

    let response = app.router.clone().oneshot(create_calendar_source()).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["source_id"], "team-calendar");
    assert_eq!(created["channel_id"], "channel-1");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sources")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sources = body_json(response).await;
    assert_eq!(sources.as_array().unwrap().len(), 1);
    assert_eq!(sources[0]["source_id"], "team-calendar");
    assert_eq!(sources[0]["phase"], "active");
    assert_eq!(sources[0]["baseline_size"], 1);
    assert_eq!(
        sources[0]["mode"]["callback_url"],
        "http://localhost:3001/webhooks/team-calendar"
    );
}

/// A notification on the current channel emits only the new event.
#[tokio::test]
async fn test_webhook_emits_new_events() {
    let app = create_test_app(&["e1"]);
    app.router.clone().oneshot(create_calendar_source()).await.unwrap();

    app.provider.events.lock().unwrap().push("e2".to_string());
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/team-calendar")
                .header("X-Channel-ID", "channel-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "processed");
    assert_eq!(body["emitted"], 1);
    assert_eq!(app.sink.ids(), vec!["e2"]);
}

/// Notifications from an unknown channel are acknowledged but ignored.
#[tokio::test]
async fn test_webhook_from_stale_channel_is_ignored() {
    let app = create_test_app(&["e1"]);
    app.router.clone().oneshot(create_calendar_source()).await.unwrap();

    app.provider.events.lock().unwrap().push("e2".to_string());
    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/webhooks/team-calendar",
            json!({ "channelId": "channel-0" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "discarded");
    assert_eq!(body["reason"], "stale_channel:channel-0");
    assert!(app.sink.events().is_empty());
}

#[tokio::test]
async fn test_webhook_for_unknown_source_is_404() {
    let app = create_test_app(&[]);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/nobody")
                .header("X-Channel-ID", "channel-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("nobody"));
}

/// Unknown providers and bad source ids are configuration errors.
#[tokio::test]
async fn test_create_with_unknown_provider_is_400() {
    let app = create_test_app(&[]);

    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/api/sources",
            json!({
                "provider": "nope",
                "mode": { "type": "poll", "interval_secs": 60 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_source() {
    let app = create_test_app(&["e1"]);
    app.router.clone().oneshot(create_calendar_source()).await.unwrap();

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/sources/team-calendar")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.router.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.router.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
