//! Anomaly detection over runtime telemetry
//!
//! Three rules are evaluated for the latest observation of a resource:
//! - Latency spikes (z-score against the rolling latency history)
//! - Error rate above a fixed threshold
//! - Token usage spikes for GenAI payloads (z-score against prior samples)

use crate::models::{AlertSeverity, AlertType, AnomalyAlert, TelemetryPoint};
use crate::stats::{self, RollingWindow};

/// Default rolling history size per metric
const DEFAULT_WINDOW_SIZE: usize = 50;

/// Minimum latency samples required before a z-score is evaluated
const MIN_SAMPLES_FOR_DETECTION: usize = 10;

/// Minimum prior token samples required for the cost rule
const MIN_TOKEN_SAMPLES: usize = 5;

/// Configuration for the anomaly engine
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Bounded history size per metric
    pub window_size: usize,
    /// Minimum latency history (including the current value)
    pub min_history: usize,
    /// Number of standard deviations considered a spike
    pub z_threshold: f64,
    /// Error rate above which a critical alert is raised
    pub error_rate_threshold: f64,
    /// Minimum prior token samples for the cost rule
    pub min_token_history: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            min_history: MIN_SAMPLES_FOR_DETECTION,
            z_threshold: 3.0, // 3 sigma
            error_rate_threshold: 0.05,
            min_token_history: MIN_TOKEN_SAMPLES,
        }
    }
}

/// Detects anomalies in the telemetry stream of a single resource
///
/// The rolling histories belong to this instance alone. Monitor several
/// resources with one engine each, otherwise their baselines mix.
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    config: AnomalyConfig,
    latency: RollingWindow,
    tokens: RollingWindow,
}

impl AnomalyEngine {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            latency: RollingWindow::new(config.window_size),
            tokens: RollingWindow::new(config.window_size),
            config,
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Number of latency samples currently held
    pub fn history_len(&self) -> usize {
        self.latency.len()
    }

    /// Push `point` into the rolling histories and evaluate every rule
    ///
    /// Alerts come back in rule order: latency, error rate, cost.
    pub fn observe(&mut self, point: &TelemetryPoint) -> Vec<AnomalyAlert> {
        self.latency.push(point.metrics.latency_ms);

        // Cost compares against prior samples, so test before pushing
        let token_alert = point.genai.as_ref().and_then(|genai| {
            let prior = self.tokens.values();
            let alert = self.token_rule(point, genai.total_tokens as f64, &prior);
            self.tokens.push(genai.total_tokens as f64);
            alert
        });

        let latency_history = self.latency.values();
        let mut alerts = Vec::new();
        alerts.extend(self.latency_rule(point, &latency_history));
        alerts.extend(self.error_rate_rule(point));
        alerts.extend(token_alert);
        alerts
    }

    /// Single-point variant: at most one alert, first matching rule wins
    pub fn analyze(&mut self, point: &TelemetryPoint) -> Option<AnomalyAlert> {
        self.observe(point).into_iter().next()
    }

    /// Stateless batch variant over a window of points
    ///
    /// The latest point by timestamp is tested against the trailing
    /// `window_size` points. Arrival order does not matter.
    pub fn detect_anomalies(&self, points: &[TelemetryPoint]) -> Vec<AnomalyAlert> {
        let mut ordered: Vec<&TelemetryPoint> = points.iter().collect();
        ordered.sort_by_key(|p| p.timestamp);

        let start = ordered.len().saturating_sub(self.config.window_size);
        let window = &ordered[start..];

        let Some((current, prior)) = window.split_last() else {
            return Vec::new();
        };

        let latencies: Vec<f64> = window.iter().map(|p| p.metrics.latency_ms).collect();

        let mut alerts = Vec::new();
        alerts.extend(self.latency_rule(current, &latencies));
        alerts.extend(self.error_rate_rule(current));

        if let Some(genai) = &current.genai {
            let prior_tokens: Vec<f64> = prior
                .iter()
                .filter_map(|p| p.genai.as_ref().map(|g| g.total_tokens as f64))
                .collect();
            alerts.extend(self.token_rule(current, genai.total_tokens as f64, &prior_tokens));
        }

        alerts
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.latency.clear();
        self.tokens.clear();
    }

    fn latency_rule(&self, point: &TelemetryPoint, history: &[f64]) -> Option<AnomalyAlert> {
        if history.len() < self.config.min_history {
            return None;
        }

        let value = point.metrics.latency_ms;
        if !stats::is_outlier(value, history, self.config.z_threshold) {
            return None;
        }

        let baseline = stats::mean(history);
        Some(AnomalyAlert::open(
            point.timestamp,
            &point.resource_id,
            AlertType::Latency,
            AlertSeverity::Warning,
            format!(
                "Latency spike detected: {:.1}ms against a baseline of {:.1}ms",
                value, baseline
            ),
            "Check recent deployments and scale up replicas if load increased",
        ))
    }

    fn error_rate_rule(&self, point: &TelemetryPoint) -> Option<AnomalyAlert> {
        let rate = point.metrics.error_rate;
        if rate <= self.config.error_rate_threshold {
            return None;
        }

        Some(AnomalyAlert::open(
            point.timestamp,
            &point.resource_id,
            AlertType::ErrorRate,
            AlertSeverity::Critical,
            format!(
                "Error rate at {:.1}% exceeds the {:.1}% threshold",
                rate * 100.0,
                self.config.error_rate_threshold * 100.0
            ),
            "Inspect service logs and roll back the latest version if errors persist",
        ))
    }

    fn token_rule(
        &self,
        point: &TelemetryPoint,
        total_tokens: f64,
        prior: &[f64],
    ) -> Option<AnomalyAlert> {
        if prior.len() < self.config.min_token_history {
            return None;
        }
        if !stats::is_outlier(total_tokens, prior, self.config.z_threshold) {
            return None;
        }

        Some(AnomalyAlert::open(
            point.timestamp,
            &point.resource_id,
            AlertType::Cost,
            AlertSeverity::Warning,
            format!(
                "Token usage spike: {:.0} tokens against a baseline of {:.0}",
                total_tokens,
                stats::mean(prior)
            ),
            "Review prompt sizes and enable response caching",
        ))
    }
}

impl Default for AnomalyEngine {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenAiMetrics, ResourceType, RuntimeMetrics};

    fn point(ts: i64, latency: f64, error_rate: f64) -> TelemetryPoint {
        TelemetryPoint::new(
            "svc-a",
            "v1",
            ResourceType::MlModel,
            RuntimeMetrics::new(latency, error_rate),
        )
        .at(ts)
    }

    fn genai_point(ts: i64, tokens: u64) -> TelemetryPoint {
        point(ts, 100.0, 0.0).with_genai(GenAiMetrics::new(tokens, 0))
    }

    /// Latencies in 46..=54 around 50ms
    fn steady_latency(i: i64) -> f64 {
        50.0 + ((i % 5) as f64 - 2.0) * 2.0
    }

    #[test]
    fn test_insufficient_history_never_flags_latency() {
        for len in 1..MIN_SAMPLES_FOR_DETECTION {
            let mut engine = AnomalyEngine::default();
            for i in 0..(len as i64 - 1) {
                assert!(engine.analyze(&point(i, steady_latency(i), 0.0)).is_none());
            }
            // History including this point is still below the minimum
            let result = engine.analyze(&point(100, 1_000_000.0, 0.0));
            assert!(result.is_none(), "history of {} flagged", len);
        }
    }

    #[test]
    fn test_latency_spike_after_steady_traffic() {
        let mut engine = AnomalyEngine::default();

        for i in 0..20 {
            let alert = engine.analyze(&point(i, steady_latency(i), 0.0));
            assert!(alert.is_none(), "steady point {} flagged", i);
        }

        let alert = engine
            .analyze(&point(20, 500.0, 0.0))
            .expect("spike should be flagged");
        assert_eq!(alert.alert_type, AlertType::Latency);
        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert!(alert.message.contains("500.0ms"));
        assert_eq!(alert.resource_id, "svc-a");
    }

    #[test]
    fn test_constant_history_no_division_by_zero() {
        let mut engine = AnomalyEngine::default();
        for i in 0..30 {
            assert!(engine.analyze(&point(i, 80.0, 0.0)).is_none());
        }
        assert_eq!(engine.history_len(), 30);
    }

    #[test]
    fn test_error_rate_without_history() {
        let mut engine = AnomalyEngine::default();
        let alert = engine.analyze(&point(0, 10.0, 0.06)).unwrap();

        assert_eq!(alert.alert_type, AlertType::ErrorRate);
        assert_eq!(alert.severity, AlertSeverity::Critical);

        // Exactly at threshold is healthy
        assert!(engine.analyze(&point(1, 10.0, 0.05)).is_none());
    }

    #[test]
    fn test_latency_checked_before_error_rate() {
        let mut engine = AnomalyEngine::default();
        for i in 0..20 {
            engine.analyze(&point(i, steady_latency(i), 0.0));
        }

        let alert = engine.analyze(&point(20, 500.0, 0.5)).unwrap();
        assert_eq!(alert.alert_type, AlertType::Latency);
    }

    #[test]
    fn test_observe_returns_every_triggered_rule() {
        let mut engine = AnomalyEngine::default();
        for i in 0..20 {
            engine.observe(&point(i, steady_latency(i), 0.0));
        }

        let alerts = engine.observe(&point(20, 500.0, 0.5));
        let types: Vec<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::Latency, AlertType::ErrorRate]);
    }

    #[test]
    fn test_window_is_bounded() {
        let config = AnomalyConfig {
            window_size: 15,
            ..Default::default()
        };
        let mut engine = AnomalyEngine::new(config);
        for i in 0..100 {
            engine.observe(&point(i, steady_latency(i), 0.0));
        }
        assert_eq!(engine.history_len(), 15);
    }

    #[test]
    fn test_token_spike_needs_prior_samples() {
        let mut engine = AnomalyEngine::default();
        // Only four prior samples
        for (i, tokens) in [100, 110, 90, 105].iter().enumerate() {
            assert!(engine.observe(&genai_point(i as i64, *tokens)).is_empty());
        }
        assert!(engine.observe(&genai_point(10, 50_000)).is_empty());
    }

    #[test]
    fn test_token_spike_flags_cost() {
        let mut engine = AnomalyEngine::default();
        for (i, tokens) in [100, 110, 90, 105, 95, 100].iter().enumerate() {
            assert!(engine.observe(&genai_point(i as i64, *tokens)).is_empty());
        }

        let alerts = engine.observe(&genai_point(10, 5_000));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Cost);
    }

    #[test]
    fn test_batch_detection_tolerates_out_of_order_arrival() {
        let engine = AnomalyEngine::default();
        let mut points: Vec<TelemetryPoint> =
            (0..20).map(|i| point(i, steady_latency(i), 0.0)).collect();
        // Spike is the newest point but arrives first
        points.insert(0, point(20, 500.0, 0.0));

        let alerts = engine.detect_anomalies(&points);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Latency);
        assert_eq!(alerts[0].timestamp, 20);
    }

    #[test]
    fn test_batch_detection_emits_multiple_alerts() {
        let engine = AnomalyEngine::default();
        let mut points: Vec<TelemetryPoint> =
            (0..20).map(|i| point(i, steady_latency(i), 0.0)).collect();
        points.push(point(20, 500.0, 0.2));

        let alerts = engine.detect_anomalies(&points);
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn test_batch_detection_small_or_empty_window() {
        let engine = AnomalyEngine::default();
        assert!(engine.detect_anomalies(&[]).is_empty());

        let points: Vec<TelemetryPoint> = (0..5)
            .map(|i| point(i, if i == 4 { 9_999.0 } else { 50.0 }, 0.0))
            .collect();
        assert!(engine.detect_anomalies(&points).is_empty());

        let alerts = engine.detect_anomalies(&[point(0, 10.0, 0.3)]);
        assert_eq!(alerts[0].alert_type, AlertType::ErrorRate);
    }
}
