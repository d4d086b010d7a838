//! # Batch Transactions
//!
//! All-or-nothing application of create/update/delete operations across
//! entity kinds. See [`BatchProcessor`].

pub mod processor;
pub mod registry;
pub mod types;

pub use processor::{BatchError, BatchProcessor};
pub use registry::EntityRegistry;
pub use types::{BatchOperation, BatchRequest, BatchResult, OperationType};
