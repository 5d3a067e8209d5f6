//! Store-call outcome reporting.

use std::fmt::Display;

use serde_json::Value;
use tokio::time::Instant;
use tracing::error;

use crate::telemetry::{AlertType, MetricKind, Telemetry};

const CLASS_TAG: &str = "class:TableClient";

/// Turns store-call outcomes into metrics, error events and log lines.
#[derive(Clone)]
pub(crate) struct StoreReporter {
    telemetry: Telemetry,
}

impl StoreReporter {
    pub(crate) fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }

    pub(crate) fn success(&self, collection: &str, method: &str) {
        self.count(collection, method, "success");
    }

    /// Log the failure and queue a failure metric plus an error event.
    pub(crate) fn failure(
        &self,
        collection: &str,
        method: &str,
        payload: &Value,
        reason: &dyn Display,
    ) {
        error!(
            collection = %collection,
            method = %method,
            payload = %payload,
            error = %reason,
            "Store call failed"
        );
        self.count(collection, method, "failure");
        self.telemetry.queue_event(
            format!("TableClient.{} failed", method),
            format!("table: {}\npayload: {}\nerror: {}", collection, payload, reason),
            AlertType::Error,
            &tags(collection, method, "failure"),
        );
    }

    /// Queue a log line with the wall time of a store call.
    pub(crate) fn timing(&self, collection: &str, method: &str, started: Instant) {
        self.telemetry.queue_log(format!(
            "TableClient.{} on {} took {}ms",
            method,
            collection,
            started.elapsed().as_millis()
        ));
    }

    fn count(&self, collection: &str, method: &str, status: &str) {
        self.telemetry.queue_metric(
            &format!("dynamodb.{}", method),
            1.0,
            MetricKind::Count,
            &tags(collection, method, status),
        );
    }
}

fn tags(collection: &str, method: &str, status: &str) -> Vec<String> {
    vec![
        format!("table:{}", collection),
        CLASS_TAG.to_string(),
        format!("method:{}", method),
        format!("status:{}", status),
    ]
}
