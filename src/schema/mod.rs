//! Key schema cache.
//!
//! Resolves the ordered key attribute names of a collection once and keeps
//! them for the lifetime of the cache. Key schemas are treated as immutable,
//! so there is no TTL and no invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::storage::{Record, StorageError, TableStore};

/// Ordered key attribute names: partition key, then optional sort key.
pub type KeySchema = Arc<[String]>;

/// The key schema of a collection could not be resolved.
#[derive(Debug, thiserror::Error)]
#[error("Key schema unavailable for {collection}: {source}")]
pub struct SchemaUnavailable {
    pub collection: String,
    pub source: StorageError,
}

/// Memoizing resolver for collection key schemas.
///
/// Concurrent first lookups for the same collection share a single
/// describe call. A failed lookup is not cached; the next call retries.
pub struct SchemaCache {
    store: Arc<dyn TableStore>,
    entries: Mutex<HashMap<String, Arc<OnceCell<KeySchema>>>>,
}

impl SchemaCache {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the key attribute names for `collection`.
    pub async fn resolve_key(&self, collection: &str) -> Result<KeySchema, SchemaUnavailable> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(collection.to_string()).or_default())
        };

        let schema = cell
            .get_or_try_init(|| async {
                let names = self
                    .store
                    .describe_key_schema(collection)
                    .await
                    .map_err(|source| SchemaUnavailable {
                        collection: collection.to_string(),
                        source,
                    })?;
                if names.is_empty() {
                    return Err(SchemaUnavailable {
                        collection: collection.to_string(),
                        source: StorageError::Unavailable("empty key schema".to_string()),
                    });
                }
                debug!(collection = %collection, key = ?names, "Cached key schema");
                Ok(KeySchema::from(names))
            })
            .await?;

        Ok(Arc::clone(schema))
    }

    /// Cached schema without triggering a lookup.
    pub fn cached(&self, collection: &str) -> Option<KeySchema> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(collection)
            .and_then(|cell| cell.get())
            .map(Arc::clone)
    }
}

/// Project `record` down to the attributes named in `schema`.
///
/// Returns the name of the first missing (or null) key attribute as the error.
pub fn project_key(schema: &[String], record: &Record) -> Result<Record, String> {
    let mut key = Record::new();
    for name in schema {
        match record.get(name) {
            Some(value) if !value.is_null() => {
                key.insert(name.clone(), value.clone());
            }
            _ => return Err(name.clone()),
        }
    }
    Ok(key)
}

#[cfg(test)]
mod tests;
