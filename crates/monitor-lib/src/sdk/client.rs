//! Buffering telemetry client
//!
//! Producers log points without ever blocking on the network. Points are
//! delivered when the buffer fills up, when the periodic timer fires, or on
//! an explicit flush. Delivery is best effort: failed points are logged and
//! dropped, never re-queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::buffer::{TelemetryBuffer, DEFAULT_MAX_BUFFER_SIZE};
use super::transport::{Endpoint, HttpTransport, Transport};
use crate::error::{DeliveryError, SdkError};
use crate::models::{
    GenAiMetrics, InfraMetrics, PredictionData, ResourceType, RuntimeMetrics, TelemetryPoint,
};

/// Default ingestion endpoint
const DEFAULT_ENDPOINT: &str = "http://localhost:8080/api/telemetry";

/// Default periodic flush interval
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Default per-point delivery timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the telemetry client
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Ingestion endpoint URL
    pub endpoint: String,
    /// Value for the `x-api-key` header
    pub api_key: Option<String>,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Buffer length that triggers an immediate flush
    pub max_buffer_size: usize,
    /// Upper bound on a single delivery
    pub request_timeout: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SdkConfig {
    fn validate(&self) -> Result<(), SdkError> {
        url::Url::parse(&self.endpoint)
            .map_err(|e| SdkError::InvalidConfig(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        if self.flush_interval.is_zero() {
            return Err(SdkError::InvalidConfig("flush interval must be positive".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(SdkError::InvalidConfig("max buffer size must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(SdkError::InvalidConfig("request timeout must be positive".into()));
        }
        Ok(())
    }

    fn target(&self) -> Endpoint {
        Endpoint {
            url: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            timeout: self.request_timeout,
        }
    }
}

/// Runtime overrides applied by [`TelemetryClient::configure`]
#[derive(Debug, Clone, Default)]
pub struct SdkConfigUpdate {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub flush_interval: Option<Duration>,
    pub max_buffer_size: Option<usize>,
    pub request_timeout: Option<Duration>,
}

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Cumulative client statistics
#[derive(Debug, Clone, Default)]
pub struct SdkStats {
    pub points_logged: u64,
    /// Non-empty flushes dispatched
    pub flushes: u64,
    pub points_delivered: u64,
    pub delivery_failures: u64,
    pub last_flush: Option<Instant>,
    pub last_error: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the client handle, the timer and flush tasks
struct ClientInner {
    config: RwLock<SdkConfig>,
    buffer: Mutex<TelemetryBuffer>,
    transport: Arc<dyn Transport>,
    stats: Mutex<SdkStats>,
    /// Background flushes not yet awaited by `shutdown`
    inflight: Mutex<Vec<JoinHandle<FlushReport>>>,
}

impl ClientInner {
    fn config(&self) -> SdkConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn flush(&self) -> FlushReport {
        let batch = lock(&self.buffer).take();
        self.deliver_batch(batch).await
    }

    /// Deliver `batch` on a background task tracked for shutdown
    fn dispatch(self: &Arc<Self>, handle: &Handle, batch: Vec<TelemetryPoint>) {
        if batch.is_empty() {
            return;
        }
        let inner = Arc::clone(self);
        let task = handle.spawn(async move { inner.deliver_batch(batch).await });

        let mut inflight = lock(&self.inflight);
        inflight.retain(|h| !h.is_finished());
        inflight.push(task);
    }

    /// Wait for every background flush, summing their reports
    async fn drain_inflight(&self) -> FlushReport {
        let tasks = std::mem::take(&mut *lock(&self.inflight));
        let mut total = FlushReport::default();
        for task in tasks {
            match task.await {
                Ok(report) => {
                    total.attempted += report.attempted;
                    total.delivered += report.delivered;
                    total.failed += report.failed;
                }
                Err(e) => error!(error = %e, "Background flush aborted"),
            }
        }
        total
    }

    /// Deliver every point concurrently; failures are independent
    async fn deliver_batch(&self, batch: Vec<TelemetryPoint>) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::default();
        }

        let config = self.config();
        let endpoint = config.target();
        let timeout = config.request_timeout;
        let started = Instant::now();

        let mut report = FlushReport {
            attempted: batch.len(),
            ..Default::default()
        };

        let mut deliveries = JoinSet::new();
        for point in batch {
            let transport = Arc::clone(&self.transport);
            let endpoint = endpoint.clone();
            deliveries.spawn(async move {
                let result =
                    match tokio::time::timeout(timeout, transport.deliver(&endpoint, &point)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(DeliveryError::Timeout(timeout)),
                    };
                (point.resource_id, result)
            });
        }

        let mut last_error = None;
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.delivered += 1,
                Ok((resource_id, Err(e))) => {
                    warn!(
                        resource_id = %resource_id,
                        error = %e,
                        "Telemetry delivery failed, dropping point"
                    );
                    report.failed += 1;
                    last_error = Some(e.to_string());
                }
                Err(e) => {
                    error!(error = %e, "Telemetry delivery task aborted");
                    report.failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        {
            let mut stats = lock(&self.stats);
            stats.flushes += 1;
            stats.points_delivered += report.delivered as u64;
            stats.delivery_failures += report.failed as u64;
            stats.last_flush = Some(Instant::now());
            if last_error.is_some() {
                stats.last_error = last_error;
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Telemetry flush finished"
        );

        report
    }
}

/// Periodic flush loop; restarts its ticker whenever the interval changes
async fn run_flush_timer(inner: Arc<ClientInner>, mut interval_rx: watch::Receiver<Duration>) {
    loop {
        let period = *interval_rx.borrow_and_update();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval_ms = period.as_millis() as u64, "Flush timer armed");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let batch = lock(&inner.buffer).take();
                    inner.dispatch(&Handle::current(), batch);
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}

/// Buffering client for the ingestion endpoint
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
    interval_tx: watch::Sender<Duration>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryClient {
    /// Create a client delivering over HTTP
    pub fn new(config: SdkConfig) -> Result<Self, SdkError> {
        let transport = HttpTransport::new()?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client with a custom transport
    pub fn with_transport(config: SdkConfig, transport: Arc<dyn Transport>) -> Result<Self, SdkError> {
        config.validate()?;

        let (interval_tx, _) = watch::channel(config.flush_interval);
        let inner = ClientInner {
            buffer: Mutex::new(TelemetryBuffer::new(config.max_buffer_size)),
            config: RwLock::new(config),
            transport,
            stats: Mutex::new(SdkStats::default()),
            inflight: Mutex::new(Vec::new()),
        };

        Ok(Self {
            inner: Arc::new(inner),
            interval_tx,
            worker: Mutex::new(None),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SdkConfig {
        self.inner.config()
    }

    /// Buffer a point; dispatches a flush when the buffer is full
    ///
    /// Never blocks on delivery. Outside a tokio runtime the size trigger
    /// cannot dispatch, and points wait for the next explicit flush.
    pub fn log_point(&self, point: TelemetryPoint) {
        let runtime = Handle::try_current().ok();

        let full_batch = {
            let mut buffer = lock(&self.inner.buffer);
            let full = buffer.push(point);
            if full && runtime.is_some() {
                Some(buffer.take())
            } else {
                None
            }
        };

        lock(&self.inner.stats).points_logged += 1;

        if let (Some(batch), Some(handle)) = (full_batch, runtime) {
            debug!(points = batch.len(), "Telemetry buffer full, flushing");
            self.inner.dispatch(&handle, batch);
        }
    }

    /// Log runtime metrics for a resource
    pub fn log_metrics(
        &self,
        resource_id: &str,
        version: &str,
        resource_type: ResourceType,
        metrics: RuntimeMetrics,
    ) {
        self.log_point(TelemetryPoint::new(resource_id, version, resource_type, metrics));
    }

    /// Log a model prediction together with its serving metrics
    pub fn log_prediction(
        &self,
        resource_id: &str,
        version: &str,
        metrics: RuntimeMetrics,
        prediction: PredictionData,
    ) {
        self.log_point(
            TelemetryPoint::new(resource_id, version, ResourceType::MlModel, metrics)
                .with_prediction(prediction),
        );
    }

    /// Log a generative model call with token usage
    pub fn log_genai(
        &self,
        resource_id: &str,
        version: &str,
        metrics: RuntimeMetrics,
        genai: GenAiMetrics,
    ) {
        self.log_point(
            TelemetryPoint::new(resource_id, version, ResourceType::GenaiModel, metrics)
                .with_genai(genai),
        );
    }

    /// Log infrastructure metrics
    pub fn log_infra(
        &self,
        resource_id: &str,
        version: &str,
        metrics: RuntimeMetrics,
        infra: InfraMetrics,
    ) {
        self.log_point(
            TelemetryPoint::new(resource_id, version, ResourceType::Infrastructure, metrics)
                .with_infra(infra),
        );
    }

    /// Swap out the buffer and deliver its points; no-op when empty
    pub async fn flush(&self) -> FlushReport {
        self.inner.flush().await
    }

    /// Start the periodic flush timer (idempotent)
    pub fn start(&self) {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let interval_rx = self.interval_tx.subscribe();
        *worker = Some(tokio::spawn(run_flush_timer(inner, interval_rx)));

        info!(
            endpoint = %self.inner.config().endpoint,
            interval_ms = self.interval_tx.borrow().as_millis() as u64,
            "Telemetry flush timer started"
        );
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Apply runtime overrides
    ///
    /// An interval change re-arms the existing timer task in place.
    pub fn configure(&self, update: SdkConfigUpdate) -> Result<(), SdkError> {
        let mut next = self.inner.config();
        if let Some(endpoint) = update.endpoint {
            next.endpoint = endpoint;
        }
        if let Some(api_key) = update.api_key {
            next.api_key = Some(api_key);
        }
        if let Some(interval) = update.flush_interval {
            next.flush_interval = interval;
        }
        if let Some(size) = update.max_buffer_size {
            next.max_buffer_size = size;
        }
        if let Some(timeout) = update.request_timeout {
            next.request_timeout = timeout;
        }
        next.validate()?;

        lock(&self.inner.buffer).set_max_size(next.max_buffer_size);
        let interval_changed = *self.interval_tx.borrow() != next.flush_interval;
        let interval = next.flush_interval;

        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;

        if interval_changed {
            self.interval_tx.send_replace(interval);
            debug!(interval_ms = interval.as_millis() as u64, "Flush interval updated");
        }

        Ok(())
    }

    /// Stop the timer, wait for background flushes and flush the rest
    ///
    /// The report covers every point delivered or dropped after the call.
    pub async fn shutdown(&self) -> FlushReport {
        if let Some(handle) = lock(&self.worker).take() {
            handle.abort();
        }
        let background = self.inner.drain_inflight().await;
        let remaining = self.inner.flush().await;
        let report = FlushReport {
            attempted: background.attempted + remaining.attempted,
            delivered: background.delivered + remaining.delivered,
            failed: background.failed + remaining.failed,
        };
        info!(
            delivered = report.delivered,
            failed = report.failed,
            "Telemetry client shut down"
        );
        report
    }

    /// Number of points waiting in the buffer
    pub fn buffered(&self) -> usize {
        lock(&self.inner.buffer).len()
    }

    pub fn stats(&self) -> SdkStats {
        lock(&self.inner.stats).clone()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.worker).take() {
            handle.abort();
        }
    }
}
