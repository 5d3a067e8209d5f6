//! DynamoDB storage implementation.

mod convert;
mod table_store;

pub use convert::{from_attribute_map, to_attribute_map};
pub use table_store::DynamoTableStore;
