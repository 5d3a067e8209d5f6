//! DynamoDB TableStore implementation.
//!
//! Collections map one-to-one onto DynamoDB tables. Key schemas come from
//! `DescribeTable` (HASH attribute first, then RANGE); bulk writes go through
//! `BatchWriteItem` and scans push attribute-containment filters down as
//! `contains(#fN, :vN)` expressions.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, KeyType, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use super::convert::{from_attribute_map, to_attribute_map};
use crate::storage::{
    BatchOutcome, Record, Result, ScanFilter, ScanPage, StorageError, TableStore, WriteOp,
};

/// DynamoDB implementation of TableStore.
pub struct DynamoTableStore {
    client: Client,
}

impl DynamoTableStore {
    /// Create a store from the default AWS configuration chain.
    ///
    /// `region` overrides the configured region; `endpoint_url` points the
    /// client at DynamoDB Local or LocalStack.
    pub async fn new(region: Option<&str>, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;

        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        info!(region = ?region, endpoint = ?endpoint_url, "Connected to DynamoDB");

        Self { client }
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn to_write_request(op: &WriteOp) -> Result<WriteRequest> {
        let request = match op {
            WriteOp::Put(record) => WriteRequest::builder()
                .put_request(
                    PutRequest::builder()
                        .set_item(Some(to_attribute_map(record)))
                        .build()
                        .map_err(|e| StorageError::InvalidRecord(e.to_string()))?,
                )
                .build(),
            WriteOp::Delete(key) => WriteRequest::builder()
                .delete_request(
                    DeleteRequest::builder()
                        .set_key(Some(to_attribute_map(key)))
                        .build()
                        .map_err(|e| StorageError::InvalidRecord(e.to_string()))?,
                )
                .build(),
        };
        Ok(request)
    }

    fn from_write_request(request: &WriteRequest) -> Option<WriteOp> {
        if let Some(put) = request.put_request() {
            return Some(WriteOp::Put(from_attribute_map(put.item())));
        }
        request
            .delete_request()
            .map(|delete| WriteOp::Delete(from_attribute_map(delete.key())))
    }
}

/// Placeholder names and values for a containment filter expression.
struct FilterExpression {
    expression: String,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    fn build(filter: &ScanFilter) -> Option<Self> {
        if filter.is_empty() {
            return None;
        }
        let mut clauses = Vec::with_capacity(filter.conditions.len());
        let mut names = HashMap::new();
        let mut values = HashMap::new();
        for (i, (attribute, needle)) in filter.conditions.iter().enumerate() {
            let name = format!("#f{}", i);
            let value = format!(":v{}", i);
            clauses.push(format!("contains({}, {})", name, value));
            names.insert(name, attribute.clone());
            let mut wrapped = Record::new();
            wrapped.insert(value.clone(), needle.clone());
            values.extend(to_attribute_map(&wrapped));
        }
        let expression = clauses.join(&format!(" {} ", filter.operator.as_str()));
        Some(Self {
            expression,
            names,
            values,
        })
    }
}

#[async_trait]
impl TableStore for DynamoTableStore {
    async fn describe_key_schema(&self, collection: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .describe_table()
            .table_name(collection)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    StorageError::TableNotFound(collection.to_string())
                } else {
                    StorageError::Unavailable(format!(
                        "DynamoDB describe_table failed: {}",
                        service_error
                    ))
                }
            })?;

        let schema = output
            .table()
            .map(|table| table.key_schema())
            .unwrap_or_default();

        let mut key = Vec::with_capacity(schema.len());
        for wanted in [KeyType::Hash, KeyType::Range] {
            key.extend(
                schema
                    .iter()
                    .filter(|element| *element.key_type() == wanted)
                    .map(|element| element.attribute_name().to_string()),
            );
        }

        if key.is_empty() {
            return Err(StorageError::Unavailable(format!(
                "DynamoDB table {} has no key schema",
                collection
            )));
        }

        debug!(table = %collection, key = ?key, "Described DynamoDB key schema");
        Ok(key)
    }

    async fn get_item(&self, collection: &str, key: &Record) -> Result<Option<Record>> {
        let output = self
            .client
            .get_item()
            .table_name(collection)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("DynamoDB get_item failed: {}", e)))?;

        Ok(output.item.as_ref().map(from_attribute_map))
    }

    async fn put_item(&self, collection: &str, record: &Record) -> Result<()> {
        self.client
            .put_item()
            .table_name(collection)
            .set_item(Some(to_attribute_map(record)))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("DynamoDB put_item failed: {}", e)))?;
        Ok(())
    }

    async fn delete_item(&self, collection: &str, key: &Record) -> Result<()> {
        self.client
            .delete_item()
            .table_name(collection)
            .set_key(Some(to_attribute_map(key)))
            .send()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("DynamoDB delete_item failed: {}", e))
            })?;
        Ok(())
    }

    async fn batch_write(&self, collection: &str, ops: &[WriteOp]) -> Result<BatchOutcome> {
        if ops.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let requests = ops
            .iter()
            .map(Self::to_write_request)
            .collect::<Result<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(collection, requests)
            .send()
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("DynamoDB batch_write_item failed: {}", e))
            })?;

        let unprocessed = output
            .unprocessed_items
            .as_ref()
            .and_then(|items| items.get(collection))
            .map(|requests| {
                requests
                    .iter()
                    .filter_map(Self::from_write_request)
                    .collect()
            })
            .unwrap_or_default();

        Ok(BatchOutcome { unprocessed })
    }

    async fn scan_page(
        &self,
        collection: &str,
        filter: Option<&ScanFilter>,
        start: Option<&Record>,
    ) -> Result<ScanPage> {
        let mut request = self
            .client
            .scan()
            .table_name(collection)
            .set_exclusive_start_key(start.map(to_attribute_map));

        if let Some(expression) = filter.and_then(FilterExpression::build) {
            request = request
                .filter_expression(expression.expression)
                .set_expression_attribute_names(Some(expression.names))
                .set_expression_attribute_values(Some(expression.values));
        }

        let output = request
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("DynamoDB scan failed: {}", e)))?;

        let items = output
            .items
            .unwrap_or_default()
            .iter()
            .map(from_attribute_map)
            .collect();
        let next = output.last_evaluated_key.as_ref().map(from_attribute_map);

        Ok(ScanPage { items, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogicalOperator;

    #[test]
    fn test_filter_expression_joins_with_operator() {
        let filter = ScanFilter::new(LogicalOperator::Or)
            .contains("name", "ada")
            .contains("tags", "vip");

        let expression = FilterExpression::build(&filter).expect("non-empty filter");
        assert_eq!(expression.expression, "contains(#f0, :v0) OR contains(#f1, :v1)");
        assert_eq!(expression.names.get("#f1").map(String::as_str), Some("tags"));
        assert_eq!(
            expression.values.get(":v0"),
            Some(&AttributeValue::S("ada".to_string()))
        );
    }

    #[test]
    fn test_empty_filter_builds_nothing() {
        assert!(FilterExpression::build(&ScanFilter::default()).is_none());
    }

    #[test]
    fn test_write_request_round_trip_for_delete() {
        let mut key = Record::new();
        key.insert("id".to_string(), serde_json::json!("x"));
        let op = WriteOp::Delete(key);

        let request = DynamoTableStore::to_write_request(&op).unwrap();
        assert_eq!(DynamoTableStore::from_write_request(&request), Some(op));
    }
}
