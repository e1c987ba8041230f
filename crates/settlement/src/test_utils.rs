//! In-memory event source for exercising the correlator without a ledger.

use alloy_primitives::Bytes;
use alloy_primitives::map::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use opflow_core::{OpId, SettlementEvent};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::source::{EventFilter, EventSubscription, SettlementEventSource};

struct MockInner {
    height: u64,
    stored: Vec<SettlementEvent>,
    revert_reasons: HashMap<(OpId, u64), Bytes>,
    subscribers: Vec<(OpId, mpsc::UnboundedSender<SettlementEvent>)>,
}

/// Scriptable [`SettlementEventSource`]: events are pushed to live
/// subscribers with [`emit`](Self::emit) or made visible to point queries
/// with [`store`](Self::store).
#[derive(Debug)]
pub struct MockEventSource {
    inner: Mutex<MockInner>,
}

impl std::fmt::Debug for MockInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockInner")
            .field("height", &self.height)
            .field("stored", &self.stored.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl MockEventSource {
    pub fn new(height: u64) -> Self {
        Self {
            inner: Mutex::new(MockInner {
                height,
                stored: Vec::new(),
                revert_reasons: HashMap::default(),
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.inner.lock().unwrap().height = height;
    }

    /// Make an event visible to `query` without notifying subscribers.
    pub fn store(&self, event: SettlementEvent) {
        self.inner.lock().unwrap().stored.push(event);
    }

    /// Deliver an event to every live subscriber for its correlation key.
    /// Subscribers whose channel has been dropped are pruned.
    pub fn emit(&self, event: SettlementEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .retain(|(op_id, tx)| *op_id != event.op_id || tx.send(event.clone()).is_ok());
    }

    pub fn set_revert_reason(&self, op_id: OpId, block_number: u64, data: Bytes) {
        self.inner
            .lock()
            .unwrap()
            .revert_reasons
            .insert((op_id, block_number), data);
    }

    /// Live subscriptions, pruning any whose receiver has been dropped.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|(_, tx)| !tx.is_closed());
        inner.subscribers.len()
    }
}

#[async_trait]
impl SettlementEventSource for MockEventSource {
    async fn query(&self, filter: &EventFilter, from_block: u64) -> Result<Vec<SettlementEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .stored
            .iter()
            .filter(|event| event.op_id == filter.op_id && event.block_number >= from_block)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, filter: &EventFilter) -> Result<EventSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .push((filter.op_id, tx));
        Ok(EventSubscription::new(rx))
    }

    async fn revert_reason(
        &self,
        filter: &EventFilter,
        block_number: u64,
    ) -> Result<Option<Bytes>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .revert_reasons
            .get(&(filter.op_id, block_number))
            .cloned())
    }

    async fn block_height(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().height)
    }
}
