//! Fire-and-forget telemetry batching.
//!
//! Metrics, events and log lines are each buffered in their own
//! [`Coalescer`] and published as one batch after a quiet window. Nothing
//! here ever reports failure to the caller: sink errors are logged and the
//! batch is dropped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::coalescer::{Coalescer, CoalescerConfig, FlushHandler};
use crate::config::TelemetryConfig;

pub mod datadog;
pub mod mock;

pub use datadog::DatadogSink;
pub use mock::RecordingSink;

const METRICS_CHANNEL: &str = "metrics";
const EVENTS_CHANNEL: &str = "events";
const LOGS_CHANNEL: &str = "logs";

/// Errors raised by a [`TelemetrySink`].
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Metric type as understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Count,
    Gauge,
    Rate,
}

/// A single metric point with its tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: String,
    /// `(unix_seconds, value)` pairs.
    pub points: Vec<(i64, f64)>,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub host: String,
    pub tags: Vec<String>,
}

/// Severity of a telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Error,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub title: String,
    pub text: String,
    pub alert_type: AlertType,
    pub tags: Vec<String>,
}

/// Destination for metric and event batches.
///
/// No ordering is required between calls; empty input is a no-op.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn submit_metrics(&self, series: Vec<MetricSeries>) -> Result<(), TelemetryError>;

    async fn submit_events(&self, events: Vec<TelemetryEvent>) -> Result<(), TelemetryError>;
}

/// Tags and naming applied to every metric.
#[derive(Debug, Clone, Default)]
struct MetricShape {
    service_name: String,
    host: String,
    default_tags: Vec<String>,
}

impl MetricShape {
    fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            service_name: config.service_name.clone(),
            host: config.host.clone().unwrap_or_default(),
            default_tags: config.default_tags(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        if self.service_name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.service_name, name)
        }
    }

    /// Default tags plus `extra`, lower-cased, de-duplicated and sorted.
    fn tags(&self, extra: &[String]) -> Vec<String> {
        self.default_tags
            .iter()
            .chain(extra)
            .map(|tag| tag.to_lowercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

struct MetricsFlusher {
    sink: Arc<dyn TelemetrySink>,
}

#[async_trait]
impl FlushHandler<MetricSeries> for MetricsFlusher {
    async fn flush(&self, _channel: &str, batch: Vec<MetricSeries>) {
        let count = batch.len();
        match self.sink.submit_metrics(batch).await {
            Ok(()) => info!(count, "Published metrics"),
            Err(e) => error!(count, error = %e, "Failed to publish metrics"),
        }
    }
}

struct EventsFlusher {
    sink: Arc<dyn TelemetrySink>,
}

#[async_trait]
impl FlushHandler<TelemetryEvent> for EventsFlusher {
    async fn flush(&self, _channel: &str, batch: Vec<TelemetryEvent>) {
        let count = batch.len();
        match self.sink.submit_events(batch).await {
            Ok(()) => info!(count, "Published events"),
            Err(e) => error!(count, error = %e, "Failed to publish events"),
        }
    }
}

struct LogFlusher;

#[async_trait]
impl FlushHandler<String> for LogFlusher {
    async fn flush(&self, _channel: &str, batch: Vec<String>) {
        for line in batch {
            info!(target: "dynaflush::statistic", "{}", line);
        }
    }
}

/// Discards everything; used when telemetry is not configured.
struct NullSink;

#[async_trait]
impl TelemetrySink for NullSink {
    async fn submit_metrics(&self, _series: Vec<MetricSeries>) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn submit_events(&self, _events: Vec<TelemetryEvent>) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Batched metrics, events and log lines.
///
/// Cloning yields a handle to the same buffers.
#[derive(Clone)]
pub struct Telemetry {
    enabled: bool,
    shape: Arc<MetricShape>,
    metrics: Coalescer<MetricSeries>,
    events: Coalescer<TelemetryEvent>,
    logs: Coalescer<String>,
}

impl Telemetry {
    /// Build from configuration.
    ///
    /// Metrics and events are dropped unless the configuration carries sink
    /// credentials; log lines always flow.
    pub fn new(config: &TelemetryConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let enabled = config.is_active();
        if !enabled {
            debug!("Telemetry disabled or credentials missing, metrics and events dropped");
        }
        Self::build(
            enabled,
            MetricShape::from_config(config),
            sink,
            CoalescerConfig::with_debounce(Duration::from_millis(config.metrics_debounce_ms)),
            CoalescerConfig::with_debounce(Duration::from_millis(config.events_debounce_ms)),
            CoalescerConfig::with_debounce(Duration::from_millis(config.logs_debounce_ms)),
        )
    }

    /// Telemetry that only emits batched log lines.
    pub fn disabled() -> Self {
        let defaults = TelemetryConfig::default();
        Self::build(
            false,
            MetricShape::default(),
            Arc::new(NullSink),
            CoalescerConfig::with_debounce(Duration::from_millis(defaults.metrics_debounce_ms)),
            CoalescerConfig::with_debounce(Duration::from_millis(defaults.events_debounce_ms)),
            CoalescerConfig::with_debounce(Duration::from_millis(defaults.logs_debounce_ms)),
        )
    }

    fn build(
        enabled: bool,
        shape: MetricShape,
        sink: Arc<dyn TelemetrySink>,
        metrics: CoalescerConfig,
        events: CoalescerConfig,
        logs: CoalescerConfig,
    ) -> Self {
        Self {
            enabled,
            shape: Arc::new(shape),
            metrics: Coalescer::new(
                "metrics",
                metrics,
                Arc::new(MetricsFlusher {
                    sink: Arc::clone(&sink),
                }),
            ),
            events: Coalescer::new("events", events, Arc::new(EventsFlusher { sink })),
            logs: Coalescer::new("logs", logs, Arc::new(LogFlusher)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Buffer one metric point stamped with the current time.
    pub fn queue_metric(&self, name: &str, value: f64, kind: MetricKind, tags: &[String]) {
        if !self.enabled {
            return;
        }
        let series = MetricSeries {
            metric: self.shape.metric_name(name),
            points: vec![(chrono::Utc::now().timestamp(), value)],
            kind,
            host: self.shape.host.clone(),
            tags: self.shape.tags(tags),
        };
        self.metrics.enqueue(METRICS_CHANNEL, series);
    }

    pub fn queue_event(
        &self,
        title: impl Into<String>,
        text: impl Into<String>,
        alert_type: AlertType,
        tags: &[String],
    ) {
        if !self.enabled {
            return;
        }
        let event = TelemetryEvent {
            title: title.into(),
            text: text.into(),
            alert_type,
            tags: tags.to_vec(),
        };
        self.events.enqueue(EVENTS_CHANNEL, event);
    }

    /// Buffer a log line; emitted through `tracing` when the batch flushes.
    pub fn queue_log(&self, message: impl Into<String>) {
        self.logs.enqueue(LOGS_CHANNEL, message.into());
    }

    /// Number of buffered items: (metrics, events, log lines).
    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.metrics.pending_len(METRICS_CHANNEL),
            self.events.pending_len(EVENTS_CHANNEL),
            self.logs.pending_len(LOGS_CHANNEL),
        )
    }

    /// Publish everything buffered and wait for it.
    pub async fn flush(&self) {
        futures::join!(
            self.metrics.flush_all(),
            self.events.flush_all(),
            self.logs.flush_all()
        );
    }
}

#[cfg(test)]
mod tests;
