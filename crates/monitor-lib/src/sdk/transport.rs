//! Delivery transport for the telemetry SDK
//!
//! The ingestion endpoint accepts one point per HTTP POST with the API key in
//! the `x-api-key` header and answers `{success, id?, error?}`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{DeliveryError, SdkError};
use crate::models::{IngestResponse, TelemetryPoint};

/// Header carrying the ingestion API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Where and how to deliver points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub api_key: Option<String>,
    /// Per-request timeout, read on every delivery
    pub timeout: Duration,
}

/// Sends a single telemetry point to the ingestion endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        endpoint: &Endpoint,
        point: &TelemetryPoint,
    ) -> Result<IngestResponse, DeliveryError>;
}

/// JSON-over-HTTP transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport; each request is bounded by its endpoint's timeout
    pub fn new() -> Result<Self, SdkError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SdkError::InvalidConfig(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(
        &self,
        endpoint: &Endpoint,
        point: &TelemetryPoint,
    ) -> Result<IngestResponse, DeliveryError> {
        let mut request = self
            .client
            .post(&endpoint.url)
            .timeout(endpoint.timeout)
            .json(point);
        if let Some(key) = &endpoint.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let parsed: IngestResponse = serde_json::from_slice(&body)
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;

        if !parsed.success {
            return Err(DeliveryError::Rejected(
                parsed.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        Ok(parsed)
    }
}
