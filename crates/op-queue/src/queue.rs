use alloy_primitives::Address;
use alloy_primitives::map::HashMap;
use opflow_core::SignedOperation;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A queued operation with its enqueue metadata.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub op: SignedOperation,
    pub enqueued_at: Instant,
}

/// Store for pending operations, keyed by originator lane.
///
/// Each originator has a FIFO lane. A drain takes at most the head entry of
/// every non-empty lane, so a single batch never carries two operations from
/// the same originator.
pub trait OperationStore {
    /// Append to the originator's lane. Never blocks on I/O; O(1).
    fn enqueue(&self, op: SignedOperation);

    /// Pop the head entry of every non-empty lane. Lanes emptied by the pop
    /// are removed to bound memory.
    fn drain(&self) -> Vec<SignedOperation>;

    /// Total pending entries across all lanes.
    fn pending_count(&self) -> usize;

    /// Time since the most recent enqueue. `None` before the first enqueue.
    fn idle_for(&self) -> Option<Duration>;
}

struct QueueLanes {
    lanes: HashMap<Address, VecDeque<QueueEntry>>,
    total: usize,
    last_enqueue: Option<Instant>,
}

/// In-memory, process-lifetime operation queue.
#[derive(Clone)]
pub struct InMemoryOperationQueue {
    inner: Arc<Mutex<QueueLanes>>,
}

impl Debug for InMemoryOperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("InMemoryOperationQueue")
            .field("pending", &inner.total)
            .field("lanes", &inner.lanes.len())
            .finish()
    }
}

impl InMemoryOperationQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueLanes {
                lanes: HashMap::default(),
                total: 0,
                last_enqueue: None,
            })),
        }
    }
}

impl Default for InMemoryOperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationStore for InMemoryOperationQueue {
    fn enqueue(&self, op: SignedOperation) {
        let mut inner = self.inner.lock().unwrap();
        debug!(
            originator = %op.originator,
            sequence = %op.sequence,
            "Enqueued operation"
        );
        inner
            .lanes
            .entry(op.originator)
            .or_default()
            .push_back(QueueEntry {
                op,
                enqueued_at: Instant::now(),
            });
        inner.total += 1;
        inner.last_enqueue = Some(Instant::now());
    }

    fn drain(&self) -> Vec<SignedOperation> {
        let mut inner = self.inner.lock().unwrap();

        let mut batch = Vec::with_capacity(inner.lanes.len());
        let mut oldest_enqueue: Option<Instant> = None;
        inner.lanes.retain(|_, lane| {
            if let Some(entry) = lane.pop_front() {
                if oldest_enqueue.is_none_or(|at| entry.enqueued_at < at) {
                    oldest_enqueue = Some(entry.enqueued_at);
                }
                batch.push(entry.op);
            }
            !lane.is_empty()
        });
        inner.total -= batch.len();

        debug!(
            drained = batch.len(),
            remaining = inner.total,
            longest_wait_ms =
                oldest_enqueue.map_or(0, |at| at.elapsed().as_millis() as u64),
            "Drained operation batch"
        );
        batch
    }

    fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().total
    }

    fn idle_for(&self) -> Option<Duration> {
        self.inner
            .lock()
            .unwrap()
            .last_enqueue
            .map(|at| at.elapsed())
    }
}
