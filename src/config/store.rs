//! Table store connection settings.

use serde::Deserialize;

/// Connection settings for the table store.
///
/// Both fields fall back to the AWS SDK's own resolution chain when unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// AWS region override.
    pub region: Option<String>,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
}
