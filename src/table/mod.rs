//! Write-coalescing table client.
//!
//! [`TableClient`] sits in front of a [`TableStore`]. Queued puts and deletes
//! are buffered per collection and flushed as deduplicated, chunked bulk
//! writes once the collection has been quiet for the debounce window. Reads
//! consult the buffer first so a caller sees its own queued writes.
//!
//! Business-path calls never fail on store errors: `get` returns `None`,
//! `put` returns `false`, `scan` returns what it gathered so far. Failures
//! are logged and reported through [`Telemetry`]. Only an unresolvable key
//! schema or a malformed delete key reaches the caller.
//!
//! Queued writes are in memory only. A crash before the flush loses them,
//! and a bulk write that still fails after its retries is dropped.

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::coalescer::Coalescer;
use crate::config::BatchConfig;
use crate::schema::{project_key, SchemaCache, SchemaUnavailable};
use crate::storage::{Record, ScanFilter, TableStore, WriteOp};
use crate::telemetry::Telemetry;
use crate::utils::retry::write_backoff;

mod flush;
mod report;

use flush::WriteFlusher;
use report::StoreReporter;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Errors surfaced to callers of [`TableClient`].
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error(transparent)]
    SchemaUnavailable(#[from] SchemaUnavailable),

    #[error("Key attribute {attribute} missing for collection {collection}")]
    InvalidKey {
        collection: String,
        attribute: String,
    },
}

/// Buffered, read-your-writes access to a table store.
///
/// Cloning yields a handle to the same buffers and schema cache.
#[derive(Clone)]
pub struct TableClient {
    store: Arc<dyn TableStore>,
    schemas: Arc<SchemaCache>,
    writes: Coalescer<WriteOp>,
    telemetry: Telemetry,
    reporter: StoreReporter,
}

impl TableClient {
    pub fn new(store: Arc<dyn TableStore>, telemetry: Telemetry, config: &BatchConfig) -> Self {
        let schemas = Arc::new(SchemaCache::new(Arc::clone(&store)));
        let reporter = StoreReporter::new(telemetry.clone());
        let flusher = WriteFlusher {
            store: Arc::clone(&store),
            schemas: Arc::clone(&schemas),
            reporter: reporter.clone(),
            chunk_size: config.effective_chunk_size(),
            backoff: write_backoff(&config.retry),
        };

        Self {
            store,
            schemas,
            writes: Coalescer::new("writes", config.coalescer(), Arc::new(flusher)),
            telemetry,
            reporter,
        }
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Point read; a queued write for the key wins over the store.
    ///
    /// A queued `Delete` resolves to `None` without a store round trip.
    pub async fn get(&self, collection: &str, key: &Record) -> Option<Record> {
        if let Some(pending) = self.pending_for(collection, key) {
            return pending;
        }

        let started = Instant::now();
        let result = self.store.get_item(collection, key).await;
        self.reporter.timing(collection, "get_item", started);
        match result {
            Ok(item) => {
                self.reporter.success(collection, "get_item");
                item
            }
            Err(e) => {
                self.reporter
                    .failure(collection, "get_item", &Value::Object(key.clone()), &e);
                None
            }
        }
    }

    /// Latest buffered operation for `key`: `Some(Some(_))` for a put,
    /// `Some(None)` for a delete, `None` when nothing is queued.
    ///
    /// Once the key schema is known, only key attributes take part in the
    /// match, so a full record finds its queued write.
    fn pending_for(&self, collection: &str, key: &Record) -> Option<Option<Record>> {
        if key.is_empty() {
            return None;
        }
        let projected = self
            .schemas
            .cached(collection)
            .and_then(|schema| project_key(&schema, key).ok());
        let key = projected.as_ref().unwrap_or(key);

        self.writes.with_pending(collection, |ops| {
            ops.iter()
                .rev()
                .find(|op| op.matches_key(key))
                .map(|op| match op {
                    WriteOp::Put(record) => Some(record.clone()),
                    WriteOp::Delete(_) => None,
                })
        })
    }

    /// Queue a put. Returns once the record is buffered.
    pub fn put(&self, collection: &str, mut record: Record) -> bool {
        stamp(&mut record);
        self.writes.enqueue(collection, WriteOp::Put(record));
        true
    }

    /// Write a single record straight to the store.
    pub async fn put_direct(&self, collection: &str, mut record: Record) -> bool {
        stamp(&mut record);
        let started = Instant::now();
        let result = self.store.put_item(collection, &record).await;
        self.reporter.timing(collection, "put_item", started);
        match result {
            Ok(()) => {
                self.reporter.success(collection, "put_item");
                true
            }
            Err(e) => {
                self.reporter
                    .failure(collection, "put_item", &Value::Object(record), &e);
                false
            }
        }
    }

    /// Queue a delete of the item identified by `record`'s key attributes.
    pub async fn delete(&self, collection: &str, record: &Record) -> Result<bool, TableError> {
        let key = self.key_of(collection, record).await?;
        self.writes.enqueue(collection, WriteOp::Delete(key));
        Ok(true)
    }

    /// Delete a single item straight from the store.
    pub async fn delete_direct(
        &self,
        collection: &str,
        record: &Record,
    ) -> Result<bool, TableError> {
        let key = self.key_of(collection, record).await?;
        let started = Instant::now();
        let result = self.store.delete_item(collection, &key).await;
        self.reporter.timing(collection, "delete_item", started);
        match result {
            Ok(()) => {
                self.reporter.success(collection, "delete_item");
                Ok(true)
            }
            Err(e) => {
                self.reporter
                    .failure(collection, "delete_item", &Value::Object(key), &e);
                Ok(false)
            }
        }
    }

    async fn key_of(&self, collection: &str, record: &Record) -> Result<Record, TableError> {
        let schema = self.schemas.resolve_key(collection).await?;
        project_key(&schema, record).map_err(|attribute| TableError::InvalidKey {
            collection: collection.to_string(),
            attribute,
        })
    }

    /// Read every page of the collection.
    ///
    /// Queued writes are not merged in. A failing page ends the scan and the
    /// items gathered so far are returned.
    pub async fn scan(&self, collection: &str, filter: Option<&ScanFilter>) -> Vec<Record> {
        let filter = filter.filter(|f| !f.is_empty());
        let mut items = Vec::new();
        let mut start: Option<Record> = None;
        let started = Instant::now();

        loop {
            match self.store.scan_page(collection, filter, start.as_ref()).await {
                Ok(page) => {
                    items.extend(page.items);
                    match page.next {
                        Some(next) => start = Some(next),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(
                        collection = %collection,
                        gathered = items.len(),
                        "Scan interrupted, returning partial result"
                    );
                    self.reporter.timing(collection, "scan", started);
                    let payload = start.map(Value::Object).unwrap_or(Value::Null);
                    self.reporter.failure(collection, "scan", &payload, &e);
                    return items;
                }
            }
        }

        self.reporter.timing(collection, "scan", started);
        self.reporter.success(collection, "scan");
        items
    }

    /// Flush every buffered write and telemetry batch, then wait for them.
    pub async fn flush(&self) {
        self.writes.flush_all().await;
        self.telemetry.flush().await;
    }

    /// Number of writes buffered for `collection`.
    pub fn pending_len(&self, collection: &str) -> usize {
        self.writes.pending_len(collection)
    }
}

/// Set `created_at` when absent and always refresh `updated_at`.
fn stamp(record: &mut Record) {
    let now = Value::from(chrono::Utc::now().timestamp_millis());
    if !record.contains_key(CREATED_AT) {
        record.insert(CREATED_AT.to_string(), now.clone());
    }
    record.insert(UPDATED_AT.to_string(), now);
}
