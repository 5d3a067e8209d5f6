//! Write channel flush: dedup, chunk, dispatch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use super::report::StoreReporter;
use crate::coalescer::FlushHandler;
use crate::schema::{project_key, SchemaCache};
use crate::storage::{StorageError, TableStore, WriteOp};
use crate::utils::retry::is_retryable;

pub(crate) const BATCH_WRITE: &str = "batch_write";

/// Result of collapsing a buffered write sequence.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Deduplicated {
    /// Surviving operations in enqueue order.
    pub ops: Vec<WriteOp>,
    /// Operations lacking a key attribute, in enqueue order.
    pub invalid: Vec<(WriteOp, String)>,
}

/// Keep only the most recently enqueued operation per key.
///
/// Walks `ops` from newest to oldest and keeps the first occurrence of every
/// key combination. A `Put` keeps its full record; only the identity used
/// for comparison is projected onto `schema`.
pub(crate) fn dedup_last_write_wins(schema: &[String], ops: Vec<WriteOp>) -> Deduplicated {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(ops.len());
    let mut invalid = Vec::new();

    for op in ops.into_iter().rev() {
        match project_key(schema, op.attributes()) {
            Ok(key) => {
                if seen.insert(Value::Object(key).to_string()) {
                    kept.push(op);
                }
            }
            Err(attribute) => invalid.push((op, attribute)),
        }
    }

    kept.reverse();
    invalid.reverse();
    Deduplicated { ops: kept, invalid }
}

/// JSON view of a set of operations for logs and error events.
pub(crate) fn ops_payload(ops: &[WriteOp]) -> Value {
    Value::Array(
        ops.iter()
            .map(|op| json!({ op.kind(): op.attributes() }))
            .collect(),
    )
}

/// Why a chunk attempt did not land in full.
#[derive(Debug, thiserror::Error)]
enum ChunkError {
    #[error(transparent)]
    Store(#[from] StorageError),

    #[error("{remaining} of {sent} operations unprocessed")]
    Unprocessed { remaining: usize, sent: usize },
}

impl ChunkError {
    fn is_retryable(&self) -> bool {
        match self {
            ChunkError::Store(e) => is_retryable(e),
            ChunkError::Unprocessed { .. } => true,
        }
    }
}

/// Flushes a collection's buffered writes to the store.
pub(crate) struct WriteFlusher {
    pub(crate) store: Arc<dyn TableStore>,
    pub(crate) schemas: Arc<SchemaCache>,
    pub(crate) reporter: StoreReporter,
    pub(crate) chunk_size: usize,
    pub(crate) backoff: ExponentialBuilder,
}

impl WriteFlusher {
    /// One bulk-write call for the operations still in `pending`.
    ///
    /// An unprocessed reply narrows `pending` to the remainder.
    async fn attempt(
        &self,
        collection: &str,
        pending: &Mutex<Vec<WriteOp>>,
    ) -> Result<usize, ChunkError> {
        let sending = pending.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let outcome = self.store.batch_write(collection, &sending).await?;
        if outcome.is_complete() {
            return Ok(sending.len());
        }
        let failure = ChunkError::Unprocessed {
            remaining: outcome.unprocessed.len(),
            sent: sending.len(),
        };
        *pending.lock().unwrap_or_else(PoisonError::into_inner) = outcome.unprocessed;
        Err(failure)
    }

    /// Send one chunk, retrying failures and unprocessed remainders while
    /// the backoff allows.
    async fn dispatch(&self, collection: &str, chunk: Vec<WriteOp>) {
        let started = Instant::now();
        let pending = Mutex::new(chunk);

        let result = (|| self.attempt(collection, &pending))
            .retry(self.backoff)
            .when(ChunkError::is_retryable)
            .notify(|e, delay| {
                warn!(
                    collection = %collection,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Bulk write incomplete, retrying"
                );
            })
            .await;

        self.reporter.timing(collection, BATCH_WRITE, started);
        match result {
            Ok(count) => {
                info!(collection = %collection, count, "Flushed write batch");
                self.reporter.success(collection, BATCH_WRITE);
            }
            Err(e) => {
                let unsent = pending.into_inner().unwrap_or_else(PoisonError::into_inner);
                self.reporter
                    .failure(collection, BATCH_WRITE, &ops_payload(&unsent), &e);
            }
        }
    }
}

#[async_trait]
impl FlushHandler<WriteOp> for WriteFlusher {
    async fn flush(&self, collection: &str, batch: Vec<WriteOp>) {
        let schema = match self.schemas.resolve_key(collection).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(
                    collection = %collection,
                    dropped = batch.len(),
                    "Dropping write batch without key schema"
                );
                self.reporter
                    .failure(collection, BATCH_WRITE, &ops_payload(&batch), &e);
                return;
            }
        };

        let buffered = batch.len();
        let Deduplicated { ops, invalid } = dedup_last_write_wins(&schema, batch);

        for (op, attribute) in &invalid {
            warn!(
                collection = %collection,
                attribute = %attribute,
                kind = op.kind(),
                "Dropping write without key attribute"
            );
        }
        if !invalid.is_empty() {
            let dropped: Vec<WriteOp> = invalid.into_iter().map(|(op, _)| op).collect();
            self.reporter.failure(
                collection,
                BATCH_WRITE,
                &ops_payload(&dropped),
                &"operations missing key attributes",
            );
        }

        if ops.is_empty() {
            return;
        }

        info!(
            collection = %collection,
            buffered,
            unique = ops.len(),
            "Dispatching deduplicated writes"
        );

        join_all(
            ops.chunks(self.chunk_size)
                .map(|chunk| self.dispatch(collection, chunk.to_vec())),
        )
        .await;
    }
}
