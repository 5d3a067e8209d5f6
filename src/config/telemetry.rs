//! Telemetry configuration.

use serde::Deserialize;

/// Credential value treated as unset.
const PLACEHOLDER: &str = "placeholder";

/// Telemetry sink credentials, naming and batching windows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Master switch for metrics and events. Log lines always flow.
    pub enabled: bool,
    pub api_key: Option<String>,
    pub app_key: Option<String>,
    /// Datadog site (`datadoghq.com`) or a full base URL.
    pub site: String,
    /// Metric name prefix and `service:` tag.
    pub service_name: String,
    pub version: String,
    pub function_name: String,
    pub function_unique_code: String,
    /// Host reported on every metric.
    pub host: Option<String>,
    pub metrics_debounce_ms: u64,
    pub events_debounce_ms: u64,
    pub logs_debounce_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            app_key: None,
            site: "datadoghq.com".to_string(),
            service_name: String::new(),
            version: String::new(),
            function_name: String::new(),
            function_unique_code: String::new(),
            host: None,
            metrics_debounce_ms: 300,
            events_debounce_ms: 300,
            logs_debounce_ms: 1000,
        }
    }
}

impl TelemetryConfig {
    /// Both keys present, non-empty and not the placeholder value.
    pub fn has_credentials(&self) -> bool {
        fn usable(key: &Option<String>) -> bool {
            key.as_deref()
                .map(str::trim)
                .is_some_and(|k| !k.is_empty() && k != PLACEHOLDER)
        }
        usable(&self.api_key) && usable(&self.app_key)
    }

    /// Whether metrics and events should be published.
    pub fn is_active(&self) -> bool {
        self.enabled && self.has_credentials()
    }

    /// Tags attached to every metric.
    pub fn default_tags(&self) -> Vec<String> {
        vec![
            format!("service:{}", self.service_name),
            format!("version:{}", self.version),
            format!("function_name:{}", self.function_name),
            format!("function_unique_code:{}", self.function_unique_code),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_keys(api: Option<&str>, app: Option<&str>) -> TelemetryConfig {
        TelemetryConfig {
            api_key: api.map(String::from),
            app_key: app.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentials() {
        assert!(with_keys(Some("a"), Some("b")).has_credentials());
        assert!(!with_keys(None, Some("b")).has_credentials());
        assert!(!with_keys(Some("a"), Some("  ")).has_credentials());
        assert!(!with_keys(Some("placeholder"), Some("b")).has_credentials());
    }

    #[test]
    fn test_disabled_switch() {
        let config = TelemetryConfig {
            enabled: false,
            ..with_keys(Some("a"), Some("b"))
        };
        assert!(config.has_credentials());
        assert!(!config.is_active());
    }

    #[test]
    fn test_default_tags() {
        let config = TelemetryConfig {
            service_name: "svc".to_string(),
            version: "1".to_string(),
            function_name: "fn".to_string(),
            function_unique_code: "x1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.default_tags(),
            vec![
                "service:svc",
                "version:1",
                "function_name:fn",
                "function_unique_code:x1"
            ]
        );
    }
}
