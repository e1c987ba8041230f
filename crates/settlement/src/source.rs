//! Boundary to the ledger's event log.

use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use opflow_core::{OpId, SettlementEvent};
use tokio::sync::mpsc;

/// Filter describing the settlement events one pending operation cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    /// Address of the settlement contract emitting the events.
    pub settlement: Address,
    /// Correlation key of the operation.
    pub op_id: OpId,
}

/// A live stream of settlement events matching one filter.
///
/// Dropping the subscription is the unsubscribe: the source observes the
/// closed channel and releases the underlying filter.
#[derive(Debug)]
pub struct EventSubscription {
    events: mpsc::UnboundedReceiver<SettlementEvent>,
}

impl EventSubscription {
    pub const fn new(events: mpsc::UnboundedReceiver<SettlementEvent>) -> Self {
        Self { events }
    }

    /// Next matching event, or `None` once the source side has closed.
    pub async fn recv(&mut self) -> Option<SettlementEvent> {
        self.events.recv().await
    }
}

/// Read access to settlement events: point-in-time queries plus live
/// subscriptions. Implementations decode raw log entries into
/// [`SettlementEvent`] at this boundary and reject malformed ones.
#[async_trait]
pub trait SettlementEventSource: Send + Sync + 'static {
    /// Events matching `filter` with block number >= `from_block`.
    async fn query(&self, filter: &EventFilter, from_block: u64) -> Result<Vec<SettlementEvent>>;

    /// Subscribe to new events matching `filter`.
    async fn subscribe(&self, filter: &EventFilter) -> Result<EventSubscription>;

    /// Raw failure bytes from the auxiliary reason event emitted for
    /// `filter`'s operation in `block_number`, if any.
    async fn revert_reason(
        &self,
        filter: &EventFilter,
        block_number: u64,
    ) -> Result<Option<Bytes>>;

    /// Current chain head height.
    async fn block_height(&self) -> Result<u64>;
}
