//! Client SDK for reporting telemetry
//!
//! This module provides:
//! - A buffering client that never blocks producers on the network
//! - Size-triggered and timer-triggered flushes with buffer swap
//! - Concurrent, independently failing per-point delivery
//! - A pluggable transport (HTTP by default)

mod buffer;
mod client;
mod transport;

#[cfg(test)]
mod tests;

pub use buffer::{TelemetryBuffer, DEFAULT_MAX_BUFFER_SIZE};
pub use client::{FlushReport, SdkConfig, SdkConfigUpdate, SdkStats, TelemetryClient};
pub use transport::{Endpoint, HttpTransport, Transport, API_KEY_HEADER};
