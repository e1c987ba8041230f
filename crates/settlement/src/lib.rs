//! Settlement correlation: matching on-chain settlement events back to the
//! callers waiting on individually submitted operations.

pub mod correlator;
pub mod metrics;
pub mod pending;
pub mod revert;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use correlator::SettlementCorrelator;
pub use pending::{
    SettlementCanceller, SettlementError, SettlementHandle, SettlementOutcome, SettlementTicket,
    settlement_channel,
};
pub use revert::{RevertReason, decode_revert};
pub use source::{EventFilter, EventSubscription, SettlementEventSource};
