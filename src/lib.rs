//! Dynaflush - write-coalescing table client
//!
//! Buffers puts and deletes per collection, flushes them as deduplicated,
//! size-bounded bulk writes after a quiet window, and serves reads from the
//! buffer before the store. The same debounce-and-flush machinery batches
//! telemetry.

pub mod coalescer;
pub mod config;
pub mod model;
pub mod schema;
pub mod storage;
pub mod table;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use storage::{Record, TableStore, WriteOp};
pub use table::{TableClient, TableError};
pub use telemetry::Telemetry;
