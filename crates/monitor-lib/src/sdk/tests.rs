//! Integration tests for the SDK client
//!
//! These tests verify:
//! - Size and timer triggered flushes
//! - Buffer swap while a flush is in flight
//! - Per-point failure isolation and timeouts
//! - Runtime reconfiguration and shutdown

use super::*;
use crate::error::DeliveryError;
use crate::models::{
    GenAiMetrics, IngestResponse, InfraMetrics, PredictionData, ResourceType, RuntimeMetrics,
    TelemetryPoint,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport that records delivered points in memory
#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<TelemetryPoint>>,
    fail_for: Option<String>,
    delay: Duration,
}

impl RecordingTransport {
    fn failing_for(resource_id: &str) -> Self {
        Self {
            fail_for: Some(resource_id.to_string()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    fn resource_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.resource_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(
        &self,
        _endpoint: &Endpoint,
        point: &TelemetryPoint,
    ) -> Result<IngestResponse, DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_for.as_deref() == Some(point.resource_id.as_str()) {
            return Err(DeliveryError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(point.clone());
        Ok(IngestResponse::accepted(format!("id-{}", point.timestamp)))
    }
}

fn create_point(resource_id: &str, timestamp: i64) -> TelemetryPoint {
    TelemetryPoint::new(
        resource_id,
        "v1",
        ResourceType::MlModel,
        RuntimeMetrics::new(20.0, 0.0),
    )
    .at(timestamp)
}

fn config(max_buffer_size: usize, flush_interval: Duration) -> SdkConfig {
    SdkConfig {
        endpoint: "http://localhost:8080/api/telemetry".to_string(),
        api_key: Some("test-key".to_string()),
        flush_interval,
        max_buffer_size,
        request_timeout: Duration::from_secs(1),
    }
}

async fn wait_for(transport: &RecordingTransport, expected: usize) {
    for _ in 0..100 {
        if transport.count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

mod flush_trigger_tests {
    use super::*;

    #[tokio::test]
    async fn test_size_trigger_flushes_once() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(5, Duration::from_secs(60)), transport.clone())
                .unwrap();

        for i in 0..4 {
            client.log_point(create_point("svc", i));
        }
        assert_eq!(client.buffered(), 4);
        assert_eq!(transport.count(), 0);

        client.log_point(create_point("svc", 4));
        assert_eq!(client.buffered(), 0);

        wait_for(&transport, 5).await;
        assert_eq!(transport.count(), 5);

        // Nothing left to send; shutdown only joins the background flush
        let report = client.shutdown().await;
        assert_eq!(report.attempted, 5);

        let stats = client.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.points_logged, 5);
        assert_eq!(stats.points_delivered, 5);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(5, Duration::from_secs(60)), transport.clone())
                .unwrap();

        let report = client.flush().await;
        assert_eq!(report, FlushReport::default());
        assert_eq!(client.stats().flushes, 0);
        assert_eq!(transport.count(), 0);
    }

    #[tokio::test]
    async fn test_timer_flushes_buffer() {
        let transport = Arc::new(RecordingTransport::default());
        let client = TelemetryClient::with_transport(
            config(100, Duration::from_millis(50)),
            transport.clone(),
        )
        .unwrap();

        client.start();
        assert!(client.is_running());

        for i in 0..3 {
            client.log_point(create_point("svc", i));
        }

        wait_for(&transport, 3).await;
        assert_eq!(transport.count(), 3);
        assert_eq!(client.buffered(), 0);
    }

    #[test]
    fn test_logging_without_runtime_keeps_points() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(2, Duration::from_secs(60)), transport.clone())
                .unwrap();

        for i in 0..3 {
            client.log_point(create_point("svc", i));
        }

        assert_eq!(client.buffered(), 3);
        assert_eq!(transport.count(), 0);
    }
}

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_isolation() {
        let transport = Arc::new(RecordingTransport::failing_for("broken"));
        let client =
            TelemetryClient::with_transport(config(50, Duration::from_secs(60)), transport.clone())
                .unwrap();

        client.log_point(create_point("a", 1));
        client.log_point(create_point("broken", 2));
        client.log_point(create_point("b", 3));
        client.log_point(create_point("c", 4));

        let report = client.flush().await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(transport.resource_ids(), vec!["a", "b", "c"]);

        // Failed points are not re-queued
        assert_eq!(client.buffered(), 0);
        let stats = client.stats();
        assert_eq!(stats.delivery_failures, 1);
        assert!(stats.last_error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_slow_delivery_times_out() {
        let transport = Arc::new(RecordingTransport::slow(Duration::from_millis(500)));
        let mut cfg = config(50, Duration::from_secs(60));
        cfg.request_timeout = Duration::from_millis(20);
        let client = TelemetryClient::with_transport(cfg, transport.clone()).unwrap();

        client.log_point(create_point("svc", 1));
        let report = client.flush().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 0);
        assert!(client.stats().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_logs_during_flush_land_in_new_buffer() {
        let transport = Arc::new(RecordingTransport::slow(Duration::from_millis(100)));
        let client = Arc::new(
            TelemetryClient::with_transport(config(50, Duration::from_secs(60)), transport.clone())
                .unwrap(),
        );

        client.log_point(create_point("first", 1));
        client.log_point(create_point("first", 2));

        let logger = client.clone();
        let (report, _) = tokio::join!(client.flush(), async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            for i in 0..3 {
                logger.log_point(create_point("second", 10 + i));
            }
        });

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(client.buffered(), 3);

        let report = client.flush().await;
        assert_eq!(report.delivered, 3);
        assert_eq!(transport.count(), 5);
    }

    #[tokio::test]
    async fn test_typed_log_helpers() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(50, Duration::from_secs(60)), transport.clone())
                .unwrap();

        client.log_metrics(
            "infra-1",
            "v1",
            ResourceType::Pipeline,
            RuntimeMetrics::new(5.0, 0.0),
        );
        client.log_prediction(
            "ranker",
            "v2",
            RuntimeMetrics::new(12.0, 0.0),
            PredictionData {
                features: [("age".to_string(), 42.0)].into_iter().collect(),
                output: 0.7,
                confidence: Some(0.9),
                ground_truth: None,
            },
        );
        client.log_genai(
            "chat",
            "v3",
            RuntimeMetrics::new(300.0, 0.0),
            GenAiMetrics::new(100, 50),
        );
        client.log_infra(
            "node-1",
            "v1",
            RuntimeMetrics::new(1.0, 0.0),
            InfraMetrics::default(),
        );

        client.flush().await;

        let delivered = transport.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 4);

        let ranker = delivered.iter().find(|p| p.resource_id == "ranker").unwrap();
        assert_eq!(ranker.resource_type, ResourceType::MlModel);
        assert_eq!(ranker.feature_value("age"), Some(42.0));

        let chat = delivered.iter().find(|p| p.resource_id == "chat").unwrap();
        assert_eq!(chat.resource_type, ResourceType::GenaiModel);
        assert_eq!(chat.genai.as_ref().unwrap().total_tokens, 150);

        let node = delivered.iter().find(|p| p.resource_id == "node-1").unwrap();
        assert_eq!(node.resource_type, ResourceType::Infrastructure);
        assert!(node.infra.is_some());
    }
}

mod configuration_tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected() {
        let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());

        let mut cfg = config(10, Duration::from_secs(1));
        cfg.endpoint = "not a url".to_string();
        assert!(TelemetryClient::with_transport(cfg, transport.clone()).is_err());

        let cfg = config(10, Duration::ZERO);
        assert!(TelemetryClient::with_transport(cfg, transport.clone()).is_err());

        let cfg = config(0, Duration::from_secs(1));
        assert!(TelemetryClient::with_transport(cfg, transport).is_err());
    }

    #[test]
    fn test_default_config() {
        let cfg = SdkConfig::default();
        assert_eq!(cfg.endpoint, "http://localhost:8080/api/telemetry");
        assert_eq!(cfg.flush_interval, Duration::from_millis(5000));
        assert_eq!(cfg.max_buffer_size, 50);
        assert!(cfg.api_key.is_none());
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_update() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(10, Duration::from_secs(1)), transport).unwrap();

        let result = client.configure(SdkConfigUpdate {
            max_buffer_size: Some(0),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(client.config().max_buffer_size, 10);
    }

    #[tokio::test]
    async fn test_configure_shrinks_buffer_trigger() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(50, Duration::from_secs(60)), transport.clone())
                .unwrap();

        client
            .configure(SdkConfigUpdate {
                max_buffer_size: Some(2),
                api_key: Some("rotated".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(client.config().api_key.as_deref(), Some("rotated"));

        client.log_point(create_point("svc", 1));
        client.log_point(create_point("svc", 2));

        wait_for(&transport, 2).await;
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn test_interval_change_restarts_timer() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(100, Duration::from_secs(3600)), transport.clone())
                .unwrap();
        client.start();

        client.log_point(create_point("svc", 1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.count(), 0);

        client
            .configure(SdkConfigUpdate {
                flush_interval: Some(Duration::from_millis(30)),
                ..Default::default()
            })
            .unwrap();

        wait_for(&transport, 1).await;
        assert_eq!(transport.count(), 1);
        assert!(client.is_running());

        // start() again must not spawn a second timer
        client.start();
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_stops_timer() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TelemetryClient::with_transport(config(100, Duration::from_secs(3600)), transport.clone())
                .unwrap();
        client.start();

        client.log_point(create_point("svc", 1));
        client.log_point(create_point("svc", 2));

        let report = client.shutdown().await;
        assert_eq!(report.delivered, 2);
        assert!(!client.is_running());
        assert_eq!(transport.count(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_background_flush() {
        let transport = Arc::new(RecordingTransport::slow(Duration::from_millis(50)));
        let client =
            TelemetryClient::with_transport(config(3, Duration::from_secs(3600)), transport.clone())
                .unwrap();

        // Three points trip the size trigger, the fourth stays buffered
        for i in 0..4 {
            client.log_point(create_point("svc", i));
        }
        assert_eq!(client.buffered(), 1);

        let report = client.shutdown().await;
        assert_eq!(report.attempted, 4);
        assert_eq!(report.delivered, 4);
        assert_eq!(transport.count(), 4);
        assert_eq!(client.stats().flushes, 2);
    }
}

mod http_tests {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_http_delivery() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/telemetry")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"id":"ok"}"#)
            .expect(3)
            .create_async()
            .await;

        let mut cfg = config(50, Duration::from_secs(60));
        cfg.endpoint = format!("{}/api/telemetry", server.url());
        let client = TelemetryClient::new(cfg).unwrap();

        for i in 0..3 {
            client.log_point(create_point("svc", i));
        }
        let report = client.flush().await;

        assert_eq!(report.delivered, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_counts_failures() {
        let mut cfg = config(50, Duration::from_secs(60));
        cfg.endpoint = "http://127.0.0.1:9/api/telemetry".to_string();
        cfg.request_timeout = Duration::from_millis(200);
        let client = TelemetryClient::new(cfg).unwrap();

        client.log_point(create_point("svc", 1));
        let report = client.flush().await;

        assert_eq!(report.failed, 1);
        assert_eq!(client.stats().delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_raised_timeout_applies_to_http_requests() {
        use std::io::Write;

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/telemetry")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(600));
                w.write_all(br#"{"success":true,"id":"slow"}"#)
            })
            .create_async()
            .await;

        let mut cfg = config(50, Duration::from_secs(60));
        cfg.endpoint = format!("{}/api/telemetry", server.url());
        cfg.request_timeout = Duration::from_millis(200);
        let client = TelemetryClient::new(cfg).unwrap();

        client
            .configure(SdkConfigUpdate {
                request_timeout: Some(Duration::from_secs(3)),
                ..Default::default()
            })
            .unwrap();

        client.log_point(create_point("svc", 1));
        let report = client.flush().await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        mock.assert_async().await;
    }
}
