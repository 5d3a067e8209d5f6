//! Mock storage implementations for testing.

mod table_store;

pub use table_store::MockTableStore;
