//! Table store collaborator.
//!
//! The durable key-value store sitting behind [`crate::table::TableClient`].
//! Implementations only need to expose point reads and writes, a bounded
//! bulk write, a paginated scan and key-schema introspection; batching,
//! deduplication and read-your-writes live above this trait.

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod mock;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use mock::MockTableStore;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoTableStore;

/// An item in a collection: an arbitrary attribute mapping.
pub type Record = Map<String, Value>;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a [`TableStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// A single mutation destined for a collection.
///
/// `Put` carries the full record; `Delete` carries only the key attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Record),
    Delete(Record),
}

impl WriteOp {
    /// The attribute mapping the operation targets (whole record or key).
    pub fn attributes(&self) -> &Record {
        match self {
            WriteOp::Put(record) => record,
            WriteOp::Delete(key) => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::Put(_) => "put",
            WriteOp::Delete(_) => "delete",
        }
    }

    /// True when every `(name, value)` in `key` is present with an equal value.
    pub fn matches_key(&self, key: &Record) -> bool {
        let attributes = self.attributes();
        key.iter()
            .all(|(name, value)| attributes.get(name) == Some(value))
    }
}

/// How scan filter conditions are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

/// Attribute-containment filter applied to a scan.
///
/// Each condition holds when the named attribute contains the given value:
/// a substring for string attributes, an element for list attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    pub conditions: Vec<(String, Value)>,
    pub operator: LogicalOperator,
}

impl ScanFilter {
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            conditions: Vec::new(),
            operator,
        }
    }

    /// Add a `contains(attribute, value)` condition.
    pub fn contains(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((attribute.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against a record.
    ///
    /// Used by in-memory stores; remote stores push the filter down instead.
    pub fn matches(&self, record: &Record) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let mut results = self
            .conditions
            .iter()
            .map(|(name, needle)| record.get(name).is_some_and(|v| contains(v, needle)));
        match self.operator {
            LogicalOperator::And => results.all(|hit| hit),
            LogicalOperator::Or => results.any(|hit| hit),
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.contains(n),
        _ => false,
    }
}

/// One page of a paginated scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Record>,
    /// Continuation token; `None` once the scan is exhausted.
    pub next: Option<Record>,
}

/// Outcome of a bulk write the store accepted.
///
/// Operations the store did not apply are handed back as `unprocessed`.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub unprocessed: Vec<WriteOp>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

/// Interface to the underlying key-value table store.
///
/// Every method is an asynchronous boundary; callers must not assume any
/// ordering between concurrently issued calls.
///
/// # Implementations
///
/// - `DynamoTableStore`: AWS DynamoDB (feature `dynamo`)
/// - `MockTableStore`: In-memory store for testing
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Ordered key attribute names (partition key, then optional sort key).
    ///
    /// Fails with [`StorageError::TableNotFound`] for unknown collections.
    async fn describe_key_schema(&self, collection: &str) -> Result<Vec<String>>;

    /// Point lookup by key. `Ok(None)` when the item does not exist.
    async fn get_item(&self, collection: &str, key: &Record) -> Result<Option<Record>>;

    /// Insert or replace a single record.
    async fn put_item(&self, collection: &str, record: &Record) -> Result<()>;

    /// Delete a single record by key. Deleting a missing item succeeds.
    async fn delete_item(&self, collection: &str, key: &Record) -> Result<()>;

    /// Apply up to [`MAX_BATCH_WRITE`] operations in one request.
    async fn batch_write(&self, collection: &str, ops: &[WriteOp]) -> Result<BatchOutcome>;

    /// Fetch one scan page starting after `start` (or from the beginning).
    async fn scan_page(
        &self,
        collection: &str,
        filter: Option<&ScanFilter>,
        start: Option<&Record>,
    ) -> Result<ScanPage>;
}

/// Maximum operations accepted by a single [`TableStore::batch_write`].
pub const MAX_BATCH_WRITE: usize = 25;
