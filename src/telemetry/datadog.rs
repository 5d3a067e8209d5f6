//! Datadog HTTP sink.
//!
//! Metrics go out as one `POST /api/v1/series` per batch. The events API has
//! no batch endpoint, so each event in a batch is posted on its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{MetricSeries, TelemetryError, TelemetryEvent, TelemetrySink};
use crate::config::TelemetryConfig;

const API_KEY_HEADER: &str = "DD-API-KEY";
const APP_KEY_HEADER: &str = "DD-APPLICATION-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telemetry sink backed by the Datadog v1 HTTP API.
pub struct DatadogSink {
    client: Client,
    base_url: String,
    api_key: String,
    app_key: String,
}

impl DatadogSink {
    pub fn new(
        site: &str,
        api_key: impl Into<String>,
        app_key: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = if site.starts_with("http://") || site.starts_with("https://") {
            site.trim_end_matches('/').to_string()
        } else {
            format!("https://api.{}", site.trim_end_matches('/'))
        };
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            app_key: app_key.into(),
        })
    }

    /// Build from configuration; `None` when credentials are missing.
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>, TelemetryError> {
        if !config.is_active() {
            return Ok(None);
        }
        let api_key = config.api_key.clone().unwrap_or_default();
        let app_key = config.app_key.clone().unwrap_or_default();
        Self::new(&config.site, api_key, app_key).map(Some)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<(), TelemetryError> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
            .header(APP_KEY_HEADER, &self.app_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for DatadogSink {
    async fn submit_metrics(&self, series: Vec<MetricSeries>) -> Result<(), TelemetryError> {
        if series.is_empty() {
            return Ok(());
        }
        self.post("/api/v1/series", &json!({ "series": series })).await?;
        debug!(count = series.len(), "Submitted metrics to Datadog");
        Ok(())
    }

    async fn submit_events(&self, events: Vec<TelemetryEvent>) -> Result<(), TelemetryError> {
        let mut last_error = None;
        for event in &events {
            let body = serde_json::to_value(event)
                .map_err(|e| TelemetryError::Unavailable(e.to_string()))?;
            if let Err(e) = self.post("/api/v1/events", &body).await {
                warn!(title = %event.title, error = %e, "Failed to submit event to Datadog");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_becomes_api_host() {
        let sink = DatadogSink::new("datadoghq.eu", "k", "a").unwrap();
        assert_eq!(sink.base_url(), "https://api.datadoghq.eu");
    }

    #[test]
    fn test_explicit_url_is_kept() {
        let sink = DatadogSink::new("http://localhost:8126/", "k", "a").unwrap();
        assert_eq!(sink.base_url(), "http://localhost:8126");
    }

    #[test]
    fn test_from_config_without_credentials() {
        let config = TelemetryConfig::default();
        assert!(DatadogSink::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_series_body_shape() {
        let series = vec![MetricSeries {
            metric: "svc.dynamodb.get".to_string(),
            points: vec![(1_700_000_000, 1.0)],
            kind: crate::telemetry::MetricKind::Count,
            host: "fn".to_string(),
            tags: vec!["table:users".to_string()],
        }];
        let body = json!({ "series": series });
        assert_eq!(
            body,
            json!({"series": [{
                "metric": "svc.dynamodb.get",
                "points": [[1_700_000_000, 1.0]],
                "type": "count",
                "host": "fn",
                "tags": ["table:users"]
            }]})
        );
    }
}
