//! Error types for the monitoring library

use thiserror::Error;

/// Errors surfaced by the monitoring service
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid telemetry point: {0}")]
    InvalidPoint(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("no values for feature {feature} on resource {resource_id}")]
    EmptyBaseline { resource_id: String, feature: String },
}

/// Errors surfaced by the client SDK
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid SDK configuration: {0}")]
    InvalidConfig(String),
}

/// Failure to deliver a single telemetry point
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("ingestion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed ingestion response: {0}")]
    InvalidResponse(String),

    #[error("point rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
