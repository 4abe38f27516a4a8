//! In-memory telemetry buffer
//!
//! Append-only until flushed. Flushing swaps the whole buffer out, so points
//! logged while a flush is in flight start a fresh buffer instead of being
//! dropped or sent twice.

use crate::models::TelemetryPoint;

/// Default number of points that triggers an immediate flush
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 50;

/// Ordered buffer of points awaiting delivery
#[derive(Debug)]
pub struct TelemetryBuffer {
    points: Vec<TelemetryPoint>,
    max_size: usize,
}

impl TelemetryBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            points: Vec::with_capacity(max_size.min(10_000)),
            max_size: max_size.max(1),
        }
    }

    /// Append a point; returns true once the buffer has reached `max_size`
    pub fn push(&mut self, point: TelemetryPoint) -> bool {
        self.points.push(point);
        self.is_full()
    }

    /// Swap out every buffered point, leaving an empty buffer behind
    pub fn take(&mut self) -> Vec<TelemetryPoint> {
        std::mem::replace(&mut self.points, Vec::with_capacity(self.max_size.min(10_000)))
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.max_size
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
    }
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_SIZE)
    }
}
