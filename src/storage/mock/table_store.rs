//! Mock TableStore implementation for testing.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{
    BatchOutcome, Record, Result, ScanFilter, ScanPage, StorageError, TableStore, WriteOp,
    MAX_BATCH_WRITE,
};

/// Default number of items examined per scan page.
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Default)]
struct MockTable {
    key_schema: Vec<String>,
    /// Items keyed by the JSON encoding of their key values.
    items: BTreeMap<String, Record>,
}

impl MockTable {
    fn item_key(&self, attributes: &Record) -> Result<String> {
        let mut values = Vec::with_capacity(self.key_schema.len());
        for name in &self.key_schema {
            match attributes.get(name) {
                Some(value) if !value.is_null() => values.push(value),
                _ => {
                    return Err(StorageError::InvalidRecord(format!(
                        "missing key attribute '{}'",
                        name
                    )))
                }
            }
        }
        serde_json::to_string(&values).map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }

    fn project_key(&self, record: &Record) -> Record {
        self.key_schema
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    fn apply(&mut self, op: &WriteOp) -> Result<()> {
        let key = self.item_key(op.attributes())?;
        match op {
            WriteOp::Put(record) => {
                self.items.insert(key, record.clone());
            }
            WriteOp::Delete(_) => {
                self.items.remove(&key);
            }
        }
        Ok(())
    }
}

/// In-memory table store with call counters and failure injection.
pub struct MockTableStore {
    tables: RwLock<HashMap<String, MockTable>>,
    batches: RwLock<Vec<(String, Vec<WriteOp>)>>,
    page_size: usize,
    describe_calls: AtomicUsize,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    fail_on_get: RwLock<bool>,
    fail_on_write: RwLock<bool>,
    failing_batch_writes: RwLock<usize>,
    unprocessed_next: RwLock<usize>,
    fail_scan_after: RwLock<Option<usize>>,
}

impl Default for MockTableStore {
    fn default() -> Self {
        Self {
            tables: RwLock::default(),
            batches: RwLock::default(),
            page_size: DEFAULT_PAGE_SIZE,
            describe_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            fail_on_get: RwLock::new(false),
            fail_on_write: RwLock::new(false),
            failing_batch_writes: RwLock::new(0),
            unprocessed_next: RwLock::new(0),
            fail_scan_after: RwLock::new(None),
        }
    }
}

impl MockTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many items each scan page examines.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register a collection with its ordered key attribute names.
    pub async fn create_table(&self, collection: &str, key_schema: &[&str]) {
        self.tables.write().await.insert(
            collection.to_string(),
            MockTable {
                key_schema: key_schema.iter().map(|k| k.to_string()).collect(),
                items: BTreeMap::new(),
            },
        );
    }

    /// Seed an item directly, bypassing counters and failure flags.
    pub async fn seed(&self, collection: &str, record: Record) -> Result<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;
        table.apply(&WriteOp::Put(record))
    }

    /// Read an item directly, bypassing counters and failure flags.
    pub async fn stored(&self, collection: &str, key: &Record) -> Option<Record> {
        let tables = self.tables.read().await;
        let table = tables.get(collection)?;
        let key = table.item_key(key).ok()?;
        table.items.get(&key).cloned()
    }

    pub async fn stored_count(&self, collection: &str) -> usize {
        self.tables
            .read()
            .await
            .get(collection)
            .map(|t| t.items.len())
            .unwrap_or(0)
    }

    /// Every bulk write received, in arrival order, including failed ones.
    pub async fn batches(&self) -> Vec<(String, Vec<WriteOp>)> {
        self.batches.read().await.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    /// Fail single-item puts and deletes.
    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Fail the next `count` bulk writes.
    pub async fn fail_next_batch_writes(&self, count: usize) {
        *self.failing_batch_writes.write().await = count;
    }

    /// Leave the last `count` operations of the next bulk write unprocessed.
    pub async fn set_unprocessed_next(&self, count: usize) {
        *self.unprocessed_next.write().await = count;
    }

    /// Let `pages` scan pages succeed, then fail every following one.
    pub async fn fail_scan_after(&self, pages: usize) {
        *self.fail_scan_after.write().await = Some(pages);
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MockTableStore {
    async fn describe_key_schema(&self, collection: &str) -> Result<Vec<String>> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.tables
            .read()
            .await
            .get(collection)
            .map(|t| t.key_schema.clone())
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))
    }

    async fn get_item(&self, collection: &str, key: &Record) -> Result<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_get.read().await {
            return Err(StorageError::Unavailable("injected get failure".to_string()));
        }
        let tables = self.tables.read().await;
        let table = tables
            .get(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;
        let key = table.item_key(key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn put_item(&self, collection: &str, record: &Record) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;
        table.apply(&WriteOp::Put(record.clone()))
    }

    async fn delete_item(&self, collection: &str, key: &Record) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write().await?;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;
        table.apply(&WriteOp::Delete(key.clone()))
    }

    async fn batch_write(&self, collection: &str, ops: &[WriteOp]) -> Result<BatchOutcome> {
        self.batches
            .write()
            .await
            .push((collection.to_string(), ops.to_vec()));

        if ops.len() > MAX_BATCH_WRITE {
            return Err(StorageError::InvalidRecord(format!(
                "batch of {} exceeds {} operations",
                ops.len(),
                MAX_BATCH_WRITE
            )));
        }

        {
            let mut failing = self.failing_batch_writes.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(StorageError::Unavailable(
                    "injected batch write failure".to_string(),
                ));
            }
        }

        let unprocessed_count = std::mem::take(&mut *self.unprocessed_next.write().await);
        let split = ops.len().saturating_sub(unprocessed_count);
        let (applied, unprocessed) = ops.split_at(split);

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;
        for op in applied {
            table.apply(op)?;
        }

        Ok(BatchOutcome {
            unprocessed: unprocessed.to_vec(),
        })
    }

    async fn scan_page(
        &self,
        collection: &str,
        filter: Option<&ScanFilter>,
        start: Option<&Record>,
    ) -> Result<ScanPage> {
        let served = self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_scan_after.read().await {
            if served >= limit {
                return Err(StorageError::Unavailable("injected scan failure".to_string()));
            }
        }

        let tables = self.tables.read().await;
        let table = tables
            .get(collection)
            .ok_or_else(|| StorageError::TableNotFound(collection.to_string()))?;

        let lower = match start {
            Some(token) => Bound::Excluded(table.item_key(token)?),
            None => Bound::Unbounded,
        };

        let examined: Vec<(&String, &Record)> = table
            .items
            .range((lower, Bound::Unbounded))
            .take(self.page_size)
            .collect();

        let exhausted = match examined.last() {
            Some((last, _)) => table
                .items
                .range::<String, _>((Bound::Excluded(*last), Bound::Unbounded))
                .next()
                .is_none(),
            None => true,
        };

        let next = if exhausted {
            None
        } else {
            examined.last().map(|(_, record)| table.project_key(record))
        };

        let items = examined
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| filter.map_or(true, |f| f.matches(record)))
            .cloned()
            .collect();

        Ok(ScanPage { items, next })
    }
}
