//! Core data models for telemetry monitoring
//!
//! All wire types serialize with camelCase field names so they match the
//! JSON accepted by the ingestion endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MlModel,
    GenaiModel,
    Infrastructure,
    Pipeline,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::MlModel => write!(f, "ml_model"),
            ResourceType::GenaiModel => write!(f, "genai_model"),
            ResourceType::Infrastructure => write!(f, "infrastructure"),
            ResourceType::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Runtime metrics carried by every telemetry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMetrics {
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_rps: Option<f64>,
    pub error_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
}

impl RuntimeMetrics {
    /// Metrics with only the mandatory fields set
    pub fn new(latency_ms: f64, error_rate: f64) -> Self {
        Self {
            latency_ms,
            throughput_rps: None,
            error_rate,
            cpu_usage: None,
            memory_usage: None,
        }
    }
}

/// Model prediction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionData {
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    pub output: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<f64>,
}

/// Token usage and cost for a generative model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenAiMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_first_token_ms: Option<f64>,
}

impl GenAiMetrics {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            model: None,
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            cost_usd: None,
            time_to_first_token_ms: None,
        }
    }
}

/// Infrastructure-level detail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// One timestamped observation of a monitored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub resource_id: String,
    pub version: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub metrics: RuntimeMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genai: Option<GenAiMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra: Option<InfraMetrics>,
}

/// Feature names that are always derivable from a point
pub const BUILTIN_FEATURES: &[&str] = &[
    "latency_ms",
    "error_rate",
    "throughput_rps",
    "cpu_usage",
    "memory_usage",
    "total_tokens",
    "prediction_output",
    "prediction_confidence",
];

impl TelemetryPoint {
    /// Create a point stamped with the current time
    pub fn new(
        resource_id: impl Into<String>,
        version: impl Into<String>,
        resource_type: ResourceType,
        metrics: RuntimeMetrics,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            resource_id: resource_id.into(),
            version: version.into(),
            resource_type,
            metrics,
            prediction: None,
            genai: None,
            infra: None,
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_prediction(mut self, prediction: PredictionData) -> Self {
        self.prediction = Some(prediction);
        self
    }

    pub fn with_genai(mut self, genai: GenAiMetrics) -> Self {
        self.genai = Some(genai);
        self
    }

    pub fn with_infra(mut self, infra: InfraMetrics) -> Self {
        self.infra = Some(infra);
        self
    }

    /// Check the numeric ranges of the runtime metrics
    pub fn validate(&self) -> Result<(), String> {
        if self.resource_id.trim().is_empty() {
            return Err("resourceId must not be empty".to_string());
        }

        let m = &self.metrics;
        if !m.latency_ms.is_finite() || m.latency_ms < 0.0 {
            return Err(format!("latencyMs must be >= 0, got {}", m.latency_ms));
        }
        if !(0.0..=1.0).contains(&m.error_rate) {
            return Err(format!("errorRate must be within [0, 1], got {}", m.error_rate));
        }
        if let Some(cpu) = m.cpu_usage {
            if !(0.0..=1.0).contains(&cpu) {
                return Err(format!("cpuUsage must be within [0, 1], got {}", cpu));
            }
        }
        if let Some(rps) = m.throughput_rps {
            if !rps.is_finite() || rps < 0.0 {
                return Err(format!("throughputRps must be >= 0, got {}", rps));
            }
        }
        if let Some(mem) = m.memory_usage {
            if !mem.is_finite() || mem < 0.0 {
                return Err(format!("memoryUsage must be >= 0, got {}", mem));
            }
        }

        Ok(())
    }

    /// Extract a named numeric feature from this point
    ///
    /// Built-in names map onto the runtime, GenAI and prediction payloads;
    /// any other name is looked up in the prediction input features.
    pub fn feature_value(&self, name: &str) -> Option<f64> {
        match name {
            "latency_ms" => Some(self.metrics.latency_ms),
            "error_rate" => Some(self.metrics.error_rate),
            "throughput_rps" => self.metrics.throughput_rps,
            "cpu_usage" => self.metrics.cpu_usage,
            "memory_usage" => self.metrics.memory_usage,
            "total_tokens" => self.genai.as_ref().map(|g| g.total_tokens as f64),
            "prediction_output" => self.prediction.as_ref().map(|p| p.output),
            "prediction_confidence" => self.prediction.as_ref().and_then(|p| p.confidence),
            other => self
                .prediction
                .as_ref()
                .and_then(|p| p.features.get(other).copied()),
        }
    }

    /// Names of every feature this point carries a value for
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_FEATURES
            .iter()
            .filter(|name| self.feature_value(name).is_some())
            .map(|name| name.to_string())
            .collect();

        if let Some(prediction) = &self.prediction {
            names.extend(
                prediction
                    .features
                    .keys()
                    .filter(|k| !BUILTIN_FEATURES.contains(&k.as_str()))
                    .cloned(),
            );
        }

        names
    }
}

/// Alert classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Latency,
    ErrorRate,
    Drift,
    Cost,
    Security,
    Infrastructure,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Latency => write!(f, "latency"),
            AlertType::ErrorRate => write!(f, "error_rate"),
            AlertType::Drift => write!(f, "drift"),
            AlertType::Cost => write!(f, "cost"),
            AlertType::Security => write!(f, "security"),
            AlertType::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Critical => write!(f, "critical"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Info => write!(f, "info"),
        }
    }
}

/// Alert lifecycle state, owned by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Investigating,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Open => write!(f, "open"),
            AlertStatus::Investigating => write!(f, "investigating"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "investigating" => Ok(AlertStatus::Investigating),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status: {}", other)),
        }
    }
}

/// Alert raised by the detection engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyAlert {
    pub id: String,
    pub timestamp: i64,
    pub resource_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub suggested_action: String,
    pub status: AlertStatus,
}

impl AnomalyAlert {
    /// New open alert with a fresh id
    pub fn open(
        timestamp: i64,
        resource_id: impl Into<String>,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            resource_id: resource_id.into(),
            alert_type,
            severity,
            message: message.into(),
            suggested_action: suggested_action.into(),
            status: AlertStatus::Open,
        }
    }
}

/// Drift scoring method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriftMethod {
    #[serde(rename = "PSI")]
    Psi,
    #[serde(rename = "KL_Divergence")]
    KlDivergence,
    #[serde(rename = "Wasserstein")]
    Wasserstein,
}

impl std::fmt::Display for DriftMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftMethod::Psi => write!(f, "PSI"),
            DriftMethod::KlDivergence => write!(f, "KL_Divergence"),
            DriftMethod::Wasserstein => write!(f, "Wasserstein"),
        }
    }
}

/// Drift severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftSeverity::Low => write!(f, "low"),
            DriftSeverity::Medium => write!(f, "medium"),
            DriftSeverity::High => write!(f, "high"),
        }
    }
}

/// Result of a drift check for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftResult {
    pub feature_name: String,
    pub drift_score: f64,
    pub method: DriftMethod,
    pub has_drift: bool,
    pub severity: DriftSeverity,
}

impl DriftResult {
    /// The "no signal" result
    pub fn none(feature_name: impl Into<String>, method: DriftMethod) -> Self {
        Self {
            feature_name: feature_name.into(),
            drift_score: 0.0,
            method,
            has_drift: false,
            severity: DriftSeverity::Low,
        }
    }
}

/// Response body of the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestResponse {
    pub fn accepted(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}
