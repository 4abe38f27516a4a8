//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use monitor_lib::{
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    MonitorSettings, ResourceType, RuntimeMetrics, TelemetryMonitor, TelemetryPoint,
};
use serde_json::{json, Value};
use std::sync::Arc;
use telemetry_monitor::api::{create_router, AppState};
use tower::ServiceExt;

const API_KEY: &str = "test-key";

async fn setup_test_app(api_key: Option<&str>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let monitor = TelemetryMonitor::new(MonitorSettings::default(), StructuredLogger::new("test"));
    let state = Arc::new(AppState::new(
        monitor,
        health_registry,
        MonitorMetrics::new(),
        api_key.map(str::to_string),
    ));
    let router = create_router(state.clone());

    (router, state)
}

fn point_json(resource: &str, ts: i64, latency: f64, error_rate: f64) -> String {
    let point = TelemetryPoint::new(
        resource,
        "v1",
        ResourceType::MlModel,
        RuntimeMetrics::new(latency, error_rate),
    )
    .at(ts);
    serde_json::to_string(&point).unwrap()
}

fn post_point(body: String, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/telemetry")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_ingest_accepts_valid_point() {
    let (app, _state) = setup_test_app(Some(API_KEY)).await;

    let response = app
        .oneshot(post_point(point_json("ranker", 1, 20.0, 0.0), Some(API_KEY)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_ingest_requires_api_key() {
    let (app, _state) = setup_test_app(Some(API_KEY)).await;

    let response = app
        .clone()
        .oneshot(post_point(point_json("ranker", 1, 20.0, 0.0), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);

    let response = app
        .oneshot(post_point(point_json("ranker", 1, 20.0, 0.0), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ingest_rejects_invalid_points() {
    let (app, _state) = setup_test_app(None).await;

    let response = app
        .clone()
        .oneshot(post_point(point_json("ranker", 1, 20.0, 1.5), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("errorRate"));

    let response = app
        .oneshot(post_point("{not json".to_string(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_telemetry_range() {
    let (app, _state) = setup_test_app(None).await;

    for ts in [10, 20, 30, 40] {
        let response = app
            .clone()
            .oneshot(post_point(point_json("etl", ts, 5.0, 0.0), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(get("/api/telemetry/etl?from=20&to=30"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let stamps: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(stamps, vec![20, 30]);
}

#[tokio::test]
async fn test_alert_listing_and_status_update() {
    let (app, _state) = setup_test_app(None).await;

    app.clone()
        .oneshot(post_point(point_json("etl", 1, 5.0, 0.4), None))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/alerts?resource_id=etl&status=open"))
        .await
        .unwrap();
    let alerts = body_json(response).await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "error_rate");
    assert_eq!(alerts[0]["severity"], "critical");

    let id = alerts[0]["id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/alerts/{id}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "resolved"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "resolved");

    let response = app
        .clone()
        .oneshot(get("/api/alerts?status=open"))
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let response = app
        .oneshot(get("/api/alerts?status=bogus"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_alert_returns_404() {
    let (app, _state) = setup_test_app(None).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/api/alerts/missing")
                .header("content-type", "application/json")
                .body(Body::from(json!({"status": "investigating"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_baseline_and_drift_report() {
    let (app, _state) = setup_test_app(None).await;

    let baseline: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/resources/scorer/baselines/latency_ms")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "values": baseline }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["samples"], 100);

    for ts in 0..50 {
        app.clone()
            .oneshot(post_point(point_json("scorer", ts, 40.0, 0.0), None))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get("/api/resources/scorer/drift"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["resourceId"], "scorer");
    assert_eq!(report["results"][0]["featureName"], "latency_ms");
    assert_eq!(report["results"][0]["method"], "PSI");
    assert_eq!(report["results"][0]["hasDrift"], true);
    assert_eq!(report["results"][0]["severity"], "high");
    assert_eq!(report["alerts"][0]["type"], "drift");

    let response = app
        .oneshot(get("/api/resources/scorer/drift?method=Wasserstein"))
        .await
        .unwrap();
    let report = body_json(response).await;
    assert_eq!(report["results"][0]["method"], "Wasserstein");
}

#[tokio::test]
async fn test_snapshot_baseline_endpoint() {
    let (app, _state) = setup_test_app(None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/resources/ghost/baselines?points=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    for ts in 0..20 {
        app.clone()
            .oneshot(post_point(point_json("etl", ts, 5.0 + ts as f64, 0.0), None))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/resources/etl/baselines?points=20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let features: Vec<&str> = body["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap())
        .collect();
    assert!(features.contains(&"latency_ms"));
    assert!(features.contains(&"error_rate"));
}

#[tokio::test]
async fn test_drift_for_unknown_resource_returns_404() {
    let (app, _state) = setup_test_app(None).await;

    let response = app
        .oneshot(get("/api/resources/ghost/drift"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_healthz_reports_components() {
    let (app, state) = setup_test_app(None).await;

    let response = app.clone().oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["ingest"].is_object());
    assert!(health["components"]["store"].is_object());
    assert!(health["components"]["alerts"].is_object());

    state
        .health_registry
        .set_unhealthy(components::INGEST, "listener closed")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_healthz_reflects_rejected_ingest() {
    let (app, state) = setup_test_app(None).await;

    for ts in 0..25 {
        app.clone()
            .oneshot(post_point(point_json("ranker", ts, 10.0, 2.0), None))
            .await
            .unwrap();
    }
    state
        .health_registry
        .apply_status(&state.monitor.take_status())
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["ingest"]["status"], "degraded");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let (app, state) = setup_test_app(None).await;

    let response = app.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["ready"], false);

    state.health_registry.set_ready(true).await;

    let response = app.oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app(None).await;

    app.clone()
        .oneshot(post_point(point_json("ranker", 1, 20.0, 0.0), None))
        .await
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("telemetry_monitor_points_ingested_total"));
    assert!(metrics_text.contains("telemetry_monitor_ingest_latency_seconds_bucket"));
}
