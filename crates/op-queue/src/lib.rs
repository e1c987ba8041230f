//! Per-originator buffering of pending signed operations.

pub mod queue;

pub use queue::{InMemoryOperationQueue, OperationStore, QueueEntry};
