//! Shared types for the opflow relay: signed meta-operations, correlation
//! keys, and settlement observations.

pub mod logger;
pub mod types;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use types::{OpId, SettlementEvent, SettlementRecord, SignedOperation};
