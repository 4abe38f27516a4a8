//! Statistics primitives shared by the detection engines

use std::collections::VecDeque;

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance, 0 for an empty slice
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Z-score of `value` against `history`
///
/// Returns `None` for an empty history or a (near) constant one, so callers
/// never divide by zero.
pub fn z_score(value: f64, history: &[f64]) -> Option<f64> {
    if history.is_empty() {
        return None;
    }

    let std_dev = std_dev(history);
    if !std_dev.is_finite() || std_dev < f64::EPSILON {
        return None;
    }

    Some((value - mean(history)) / std_dev)
}

/// One-sided outlier test: true only for spikes above `threshold` sigmas
pub fn is_outlier(value: f64, history: &[f64], threshold: f64) -> bool {
    z_score(value, history).is_some_and(|z| z > threshold)
}

/// Bounded FIFO of samples
///
/// Pushing beyond `capacity` evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest one when full
    pub fn push(&mut self, value: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Contiguous copy of the samples, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.values())
    }

    pub fn std_dev(&self) -> f64 {
        std_dev(&self.values())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
