//! HTTP API for ingestion, queries, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::MonitorMetrics,
    sdk::API_KEY_HEADER,
    AlertFilter, AlertStatus, DriftMethod, IngestResponse, MonitorError, TelemetryMonitor,
    TelemetryPoint, TelemetryQuery,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub monitor: TelemetryMonitor,
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    /// Required `x-api-key` value for write routes
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(
        monitor: TelemetryMonitor,
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        api_key: Option<String>,
    ) -> Self {
        Self {
            monitor,
            health_registry,
            metrics,
            api_key,
        }
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Error mapped onto an HTTP status with a JSON `{error}` body
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Monitor(MonitorError),
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        ApiError::Monitor(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid api key".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Monitor(e) => {
                let status = match e {
                    MonitorError::InvalidPoint(_) | MonitorError::EmptyBaseline { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    MonitorError::UnknownResource(_) | MonitorError::AlertNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                };
                (status, e.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Ingest one telemetry point
///
/// Always answers with an `IngestResponse` body so SDK clients can parse
/// rejections the same way as acceptances.
async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if state.authorize(&headers).is_err() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(IngestResponse::rejected("invalid api key")),
        );
    }

    let point: TelemetryPoint = match serde_json::from_slice(&body) {
        Ok(point) => point,
        Err(e) => {
            state.metrics.inc_invalid_points();
            return (
                StatusCode::BAD_REQUEST,
                Json(IngestResponse::rejected(format!("malformed telemetry point: {e}"))),
            );
        }
    };

    match state.monitor.ingest(point) {
        Ok(outcome) => (StatusCode::OK, Json(IngestResponse::accepted(outcome.id))),
        Err(e) => (StatusCode::BAD_REQUEST, Json(IngestResponse::rejected(e.to_string()))),
    }
}

#[derive(Debug, Deserialize)]
struct TelemetryParams {
    from: Option<i64>,
    to: Option<i64>,
    limit: Option<usize>,
}

async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
    Query(params): Query<TelemetryParams>,
) -> Json<Vec<TelemetryPoint>> {
    let query = TelemetryQuery {
        resource_id,
        from: params.from,
        to: params.to,
        limit: params.limit,
    };
    Json(state.monitor.query(&query))
}

#[derive(Debug, Deserialize)]
struct AlertParams {
    resource_id: Option<String>,
    status: Option<String>,
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
) -> Result<impl IntoResponse, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<AlertStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = AlertFilter {
        resource_id: params.resource_id,
        status,
    };
    Ok(Json(state.monitor.list_alerts(&filter)))
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: AlertStatus,
}

async fn update_alert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;
    let alert = state.monitor.update_alert_status(&id, update.status)?;
    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
struct BaselineBody {
    values: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BaselineResponse {
    resource_id: String,
    features: Vec<String>,
    samples: Option<usize>,
}

async fn put_baseline(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((resource_id, feature)): Path<(String, String)>,
    Json(body): Json<BaselineBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;
    let samples = state.monitor.set_baseline(&resource_id, &feature, body.values)?;
    Ok(Json(BaselineResponse {
        resource_id,
        features: vec![feature],
        samples: Some(samples),
    }))
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    points: Option<usize>,
}

async fn snapshot_baseline(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(resource_id): Path<String>,
    Query(params): Query<SnapshotParams>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(&headers)?;
    let points = params
        .points
        .unwrap_or(state.monitor.settings().drift_window);
    if points == 0 {
        return Err(ApiError::BadRequest("points must be positive".to_string()));
    }

    let features = state.monitor.snapshot_baseline(&resource_id, points)?;
    Ok(Json(BaselineResponse {
        resource_id,
        features,
        samples: None,
    }))
}

#[derive(Debug, Deserialize)]
struct DriftParams {
    method: Option<DriftMethod>,
}

async fn drift_report(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
    Query(params): Query<DriftParams>,
) -> Result<impl IntoResponse, ApiError> {
    let method = params.method.unwrap_or(DriftMethod::Psi);
    let report = state.monitor.drift_report_with(&resource_id, method)?;
    Ok(Json(report))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/telemetry", post(ingest))
        .route("/api/telemetry/:resource_id", get(get_telemetry))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id", patch(update_alert))
        .route(
            "/api/resources/:resource_id/baselines",
            post(snapshot_baseline),
        )
        .route(
            "/api/resources/:resource_id/baselines/:feature",
            put(put_baseline),
        )
        .route("/api/resources/:resource_id/drift", get(drift_report))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
