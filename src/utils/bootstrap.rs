//! Bootstrap utilities.
//!
//! Shared initialization for processes embedding the table client.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, TelemetryConfig, LOG_ENV_VAR};
use crate::storage::TableStore;
use crate::table::TableClient;
use crate::telemetry::{DatadogSink, Telemetry};

/// Initialize tracing with the DYNAFLUSH_LOG environment variable.
///
/// Defaults to "info" level if DYNAFLUSH_LOG is not set. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Build the telemetry batcher for `config`.
///
/// Falls back to log-only telemetry when credentials are missing or the
/// HTTP client cannot be built.
pub fn build_telemetry(config: &TelemetryConfig) -> Telemetry {
    match DatadogSink::from_config(config) {
        Ok(Some(sink)) => {
            info!(url = %sink.base_url(), "Telemetry publishing to Datadog");
            Telemetry::new(config, Arc::new(sink))
        }
        Ok(None) => Telemetry::disabled(),
        Err(e) => {
            warn!(error = %e, "Failed to build telemetry sink, metrics disabled");
            Telemetry::disabled()
        }
    }
}

/// Wire a [`TableClient`] over `store` from configuration.
pub fn table_client(config: &Config, store: Arc<dyn TableStore>) -> TableClient {
    TableClient::new(store, build_telemetry(&config.telemetry), &config.batch)
}

/// Connect to DynamoDB and wire a [`TableClient`] over it.
#[cfg(feature = "dynamo")]
pub async fn connect(config: &Config) -> TableClient {
    let store = crate::storage::DynamoTableStore::new(
        config.store.region.as_deref(),
        config.store.endpoint_url.as_deref(),
    )
    .await;
    table_client(config, Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockTableStore;

    #[test]
    fn test_build_telemetry_without_credentials() {
        let telemetry = build_telemetry(&TelemetryConfig::default());
        assert!(!telemetry.is_enabled());
    }

    #[tokio::test]
    async fn test_build_telemetry_with_credentials() {
        let config = TelemetryConfig {
            api_key: Some("api".to_string()),
            app_key: Some("app".to_string()),
            ..Default::default()
        };
        assert!(build_telemetry(&config).is_enabled());
    }

    #[tokio::test]
    async fn test_table_client_uses_batch_config() {
        let store = Arc::new(MockTableStore::new());
        store.create_table("users", &["id"]).await;
        let client = table_client(&Config::for_test(), store);
        assert!(!client.telemetry().is_enabled());
        assert_eq!(client.pending_len("users"), 0);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
