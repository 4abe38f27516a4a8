//! Distribution drift detection
//!
//! Compares a stored baseline sample of a numeric feature with a current
//! sample using the Population Stability Index:
//! - PSI <= 0.1: no significant drift
//! - PSI 0.1-0.2: moderate drift
//! - PSI > 0.2: significant drift
//!
//! Buckets partition the baseline range `[min, max]` into equal widths.
//! Values outside the range snap to the first or last bucket. A value that
//! lands exactly on an interior boundary belongs to the lower bucket: bucket 0
//! is `[min, min + w]`, every other bucket `k` is `(min + k*w, min + (k+1)*w]`.

use std::collections::HashMap;

use crate::models::{DriftMethod, DriftResult, DriftSeverity};

/// Default number of histogram buckets
const DEFAULT_BUCKETS: usize = 10;

/// Smoothing added to every bucket proportion
const DEFAULT_EPSILON: f64 = 0.0001;

/// Configuration for drift scoring
#[derive(Debug, Clone)]
pub struct DriftConfig {
    /// Number of equal-width buckets over the baseline range
    pub buckets: usize,
    /// Smoothing for empty buckets (prevents ln(0) and division by zero)
    pub epsilon: f64,
    /// Scores above this are medium drift
    pub medium_threshold: f64,
    /// Scores above this are high drift
    pub high_threshold: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            epsilon: DEFAULT_EPSILON,
            medium_threshold: 0.1,
            high_threshold: 0.2,
        }
    }
}

/// Stored baseline sample with its range
#[derive(Debug, Clone)]
struct Baseline {
    values: Vec<f64>,
    min: f64,
    max: f64,
}

impl Baseline {
    fn from_values(values: Vec<f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        let min = values.iter().copied().reduce(f64::min)?;
        let max = values.iter().copied().reduce(f64::max)?;
        Some(Self { values, min, max })
    }

    fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Per-feature drift detector
///
/// The engine owns copies of all baselines; callers hand over a sample,
/// never a live reference.
#[derive(Debug, Clone, Default)]
pub struct DriftEngine {
    config: DriftConfig,
    baselines: HashMap<String, Baseline>,
}

impl DriftEngine {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            baselines: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Store or overwrite the baseline for `feature`
    ///
    /// Non-finite values are discarded. An empty sample removes the baseline.
    pub fn set_baseline(&mut self, feature: impl Into<String>, values: Vec<f64>) {
        let feature = feature.into();
        match Baseline::from_values(values) {
            Some(baseline) => {
                self.baselines.insert(feature, baseline);
            }
            None => {
                self.baselines.remove(&feature);
            }
        }
    }

    pub fn clear_baseline(&mut self, feature: &str) -> bool {
        self.baselines.remove(feature).is_some()
    }

    pub fn has_baseline(&self, feature: &str) -> bool {
        self.baselines.contains_key(feature)
    }

    /// Size of the stored baseline sample
    pub fn baseline_len(&self, feature: &str) -> usize {
        self.baselines.get(feature).map_or(0, |b| b.values.len())
    }

    /// Features with a stored baseline, sorted by name
    pub fn features(&self) -> Vec<String> {
        let mut names: Vec<String> = self.baselines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Score `current` against the baseline of `feature` using PSI
    pub fn detect_drift(&self, feature: &str, current: &[f64]) -> DriftResult {
        self.detect_drift_with(feature, current, DriftMethod::Psi)
    }

    /// Score `current` against the baseline of `feature` with `method`
    ///
    /// Missing baselines and empty samples yield the zero-score result.
    pub fn detect_drift_with(
        &self,
        feature: &str,
        current: &[f64],
        method: DriftMethod,
    ) -> DriftResult {
        let Some(baseline) = self.baselines.get(feature) else {
            return DriftResult::none(feature, method);
        };

        let current: Vec<f64> = current.iter().copied().filter(|v| v.is_finite()).collect();
        if baseline.values.is_empty() || current.is_empty() {
            return DriftResult::none(feature, method);
        }

        let score = match method {
            DriftMethod::Psi => self.psi(baseline, &current),
            DriftMethod::KlDivergence => self.kl_divergence(baseline, &current),
            DriftMethod::Wasserstein => wasserstein(baseline, &current),
        };

        let severity = self.classify(score);
        DriftResult {
            feature_name: feature.to_string(),
            drift_score: score,
            method,
            has_drift: severity != DriftSeverity::Low,
            severity,
        }
    }

    /// Per-bucket counts of `values` over the baseline partition of `feature`
    ///
    /// Every finite value lands in exactly one bucket. NaN and infinite
    /// values are skipped, as they are when scoring, so the counts sum to the
    /// number of finite values.
    pub fn bucket_counts(&self, feature: &str, values: &[f64]) -> Option<Vec<usize>> {
        self.baselines
            .get(feature)
            .map(|baseline| self.histogram(baseline, values))
    }

    fn classify(&self, score: f64) -> DriftSeverity {
        if score > self.config.high_threshold {
            DriftSeverity::High
        } else if score > self.config.medium_threshold {
            DriftSeverity::Medium
        } else {
            DriftSeverity::Low
        }
    }

    fn bucket_count(&self) -> usize {
        self.config.buckets.max(1)
    }

    fn bucket_index(&self, baseline: &Baseline, value: f64) -> usize {
        let last = self.bucket_count() - 1;
        if value <= baseline.min {
            return 0;
        }
        if value > baseline.max {
            return last;
        }

        let width = baseline.range() / self.bucket_count() as f64;
        if width <= 0.0 {
            return 0;
        }

        // Upper boundaries are inclusive, so ceil then step back one
        let position = ((value - baseline.min) / width).ceil() as usize;
        position.saturating_sub(1).min(last)
    }

    fn histogram(&self, baseline: &Baseline, values: &[f64]) -> Vec<usize> {
        let mut counts = vec![0usize; self.bucket_count()];
        for &value in values.iter().filter(|v| v.is_finite()) {
            counts[self.bucket_index(baseline, value)] += 1;
        }
        counts
    }

    /// Smoothed bucket proportions of the baseline and the current sample
    fn proportions(&self, baseline: &Baseline, current: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let to_pct = |counts: Vec<usize>, total: usize| -> Vec<f64> {
            counts
                .into_iter()
                .map(|c| c as f64 / total as f64 + self.config.epsilon)
                .collect()
        };

        let base = to_pct(self.histogram(baseline, &baseline.values), baseline.values.len());
        let cur = to_pct(self.histogram(baseline, current), current.len());
        (base, cur)
    }

    /// PSI = sum of (cur% - base%) * ln(cur% / base%)
    fn psi(&self, baseline: &Baseline, current: &[f64]) -> f64 {
        let (base, cur) = self.proportions(baseline, current);
        let psi: f64 = base
            .iter()
            .zip(&cur)
            .map(|(b, c)| (c - b) * (c / b).ln())
            .sum();
        psi.max(0.0)
    }

    /// KL(current || baseline) over the same buckets
    fn kl_divergence(&self, baseline: &Baseline, current: &[f64]) -> f64 {
        let (base, cur) = self.proportions(baseline, current);
        let kl: f64 = base.iter().zip(&cur).map(|(b, c)| c * (c / b).ln()).sum();
        kl.max(0.0)
    }
}

/// Earth mover's distance between two empirical samples, scaled by the
/// baseline range when it is non-zero
fn wasserstein(baseline: &Baseline, current: &[f64]) -> f64 {
    let mut base = baseline.values.clone();
    let mut cur = current.to_vec();
    base.sort_by(f64::total_cmp);
    cur.sort_by(f64::total_cmp);

    let mut all: Vec<f64> = base.iter().chain(cur.iter()).copied().collect();
    all.sort_by(f64::total_cmp);

    let (nb, nc) = (base.len() as f64, cur.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut distance = 0.0;

    for pair in all.windows(2) {
        let x = pair[0];
        while i < base.len() && base[i] <= x {
            i += 1;
        }
        while j < cur.len() && cur[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / nb - j as f64 / nc).abs();
        distance += gap * (pair[1] - x);
    }

    let range = baseline.range();
    if range > f64::EPSILON {
        distance / range
    } else {
        distance
    }
}
