//! Typed entities over [`TableClient`].
//!
//! An [`Entity`] is a serde type bound to a collection through its entity
//! name; [`Repository`] resolves the table once and converts records to and
//! from the entity type.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{ConfigError, TableNames};
use crate::storage::{Record, ScanFilter};
use crate::table::{TableClient, TableError};

/// A record type stored in its own collection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Logical name, mapped to a table through `DYNAMODB_TABLE_<NAME>`.
    const ENTITY_NAME: &'static str;
}

/// Serialize an entity into a record. Non-object serializations are rejected.
pub fn to_record<E: Serialize>(entity: &E) -> Result<Record, serde_json::Error> {
    match serde_json::to_value(entity)? {
        Value::Object(record) => Ok(record),
        other => Err(serde::ser::Error::custom(format!(
            "entity serialized to {} instead of an object",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Copy every field of `incoming` that differs into `current`.
///
/// Returns the names of the changed fields in `incoming`'s order.
pub fn merge_changes(current: &mut Record, incoming: &Record) -> Vec<String> {
    let mut changed = Vec::new();
    for (name, value) in incoming {
        if current.get(name) != Some(value) {
            current.insert(name.clone(), value.clone());
            changed.push(name.clone());
        }
    }
    changed
}

/// Typed access to the collection of `E`.
pub struct Repository<E> {
    client: TableClient,
    table: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            table: self.table.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    /// Bind to the table configured for `E`; fails fast when unmapped.
    pub fn new(client: TableClient, names: &TableNames) -> Result<Self, ConfigError> {
        let table = names.resolve(E::ENTITY_NAME)?.to_string();
        Ok(Self::with_table(client, table))
    }

    pub fn with_table(client: TableClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn get(&self, key: &Record) -> Option<E> {
        let record = self.client.get(&self.table, key).await?;
        self.decode(record)
    }

    /// Queue a put of `entity`.
    pub fn save(&self, entity: &E) -> bool {
        match to_record(entity) {
            Ok(record) => self.client.put(&self.table, record),
            Err(e) => {
                warn!(entity = E::ENTITY_NAME, error = %e, "Failed to serialize entity");
                false
            }
        }
    }

    /// Merge `incoming` into the stored entity and queue a put when anything
    /// changed. Returns the changed field names.
    pub async fn update(&self, key: &Record, incoming: &E) -> Vec<String> {
        let incoming = match to_record(incoming) {
            Ok(record) => record,
            Err(e) => {
                warn!(entity = E::ENTITY_NAME, error = %e, "Failed to serialize entity");
                return Vec::new();
            }
        };
        let mut current = self.client.get(&self.table, key).await.unwrap_or_default();
        let changed = merge_changes(&mut current, &incoming);
        if !changed.is_empty() {
            self.client.put(&self.table, current);
        }
        changed
    }

    /// Queue a delete by key.
    pub async fn delete(&self, key: &Record) -> Result<bool, TableError> {
        self.client.delete(&self.table, key).await
    }

    /// Queue a delete of `entity`, keyed by its own key attributes.
    pub async fn delete_entity(&self, entity: &E) -> Result<bool, TableError> {
        match to_record(entity) {
            Ok(record) => self.client.delete(&self.table, &record).await,
            Err(e) => {
                warn!(entity = E::ENTITY_NAME, error = %e, "Failed to serialize entity");
                Ok(false)
            }
        }
    }

    /// Every stored entity matching `filter`. Records that do not decode are skipped.
    pub async fn scan(&self, filter: Option<&ScanFilter>) -> Vec<E> {
        self.client
            .scan(&self.table, filter)
            .await
            .into_iter()
            .filter_map(|record| self.decode(record))
            .collect()
    }

    fn decode(&self, record: Record) -> Option<E> {
        match serde_json::from_value(Value::Object(record)) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(
                    entity = E::ENTITY_NAME,
                    table = %self.table,
                    error = %e,
                    "Failed to decode record"
                );
                None
            }
        }
    }
}
