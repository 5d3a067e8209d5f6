//! Mock telemetry sink for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MetricSeries, TelemetryError, TelemetryEvent, TelemetrySink};

/// Sink that keeps every submitted batch in memory.
#[derive(Default)]
pub struct RecordingSink {
    metric_batches: RwLock<Vec<Vec<MetricSeries>>>,
    event_batches: RwLock<Vec<Vec<TelemetryEvent>>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following submission fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn metric_batches(&self) -> Vec<Vec<MetricSeries>> {
        self.metric_batches.read().await.clone()
    }

    pub async fn metrics(&self) -> Vec<MetricSeries> {
        self.metric_batches.read().await.concat()
    }

    pub async fn event_batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.event_batches.read().await.clone()
    }

    pub async fn events(&self) -> Vec<TelemetryEvent> {
        self.event_batches.read().await.concat()
    }

    /// Submissions received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TelemetryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TelemetryError::Unavailable("injected sink failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn submit_metrics(&self, series: Vec<MetricSeries>) -> Result<(), TelemetryError> {
        self.check()?;
        if !series.is_empty() {
            self.metric_batches.write().await.push(series);
        }
        Ok(())
    }

    async fn submit_events(&self, events: Vec<TelemetryEvent>) -> Result<(), TelemetryError> {
        self.check()?;
        if !events.is_empty() {
            self.event_batches.write().await.push(events);
        }
        Ok(())
    }
}
