//! The batch scheduler: accumulates operations, evaluates the flush policy,
//! and submits at most one batch at a time.

use alloy_primitives::Address;
use alloy_primitives::map::HashMap;
use anyhow::Result;
use opflow_core::{OpId, SignedOperation};
use opflow_queue::{InMemoryOperationQueue, OperationStore};
use opflow_settlement::{
    SettlementCorrelator, SettlementEventSource, SettlementHandle, SettlementTicket,
    settlement_channel,
};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::metrics::SchedulerMetrics;
use crate::policy::FlushPolicy;
use crate::transport::BatchTransport;

struct SchedulerInner<T, S> {
    queue: InMemoryOperationQueue,
    transport: T,
    correlator: SettlementCorrelator<S>,
    policy: FlushPolicy,
    settlement: Address,
    chain_id: u64,
    /// Pending settlements for operations not yet handed to the transport,
    /// keyed by correlation key. Entries move to the correlator at flush.
    tickets: Mutex<HashMap<OpId, SettlementTicket>>,
    /// At most one flush in flight per scheduler instance. Contended
    /// attempts are no-ops; they do not queue up behind the running flush.
    flush_guard: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
    metrics: SchedulerMetrics,
}

/// Facade over the queue/correlator pair exposed to producers: `enqueue`
/// returns a pending-settlement handle, `tick`/`flush_now`/`start_timer`
/// drive batch submission.
pub struct BatchScheduler<T, S> {
    inner: Arc<SchedulerInner<T, S>>,
}

impl<T, S> Clone for BatchScheduler<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, S> Debug for BatchScheduler<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("pending", &self.inner.queue.pending_count())
            .field("settlement", &self.inner.settlement)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl<T, S> BatchScheduler<T, S>
where
    T: BatchTransport,
    S: SettlementEventSource,
{
    pub fn new(
        transport: T,
        correlator: SettlementCorrelator<S>,
        policy: FlushPolicy,
        settlement: Address,
        chain_id: u64,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue: InMemoryOperationQueue::new(),
                transport,
                correlator,
                policy,
                settlement,
                chain_id,
                tickets: Mutex::new(HashMap::default()),
                flush_guard: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                metrics: SchedulerMetrics::default(),
            }),
        }
    }

    /// Queue an operation for the next eligible batch.
    ///
    /// Never blocks; may be called freely while a flush is in flight (the
    /// operation lands in the next drain). Re-enqueueing an operation with
    /// the same correlation key replaces its pending settlement; the old
    /// handle reports `Abandoned`.
    pub fn enqueue(&self, op: SignedOperation) -> SettlementHandle {
        let op_id = op.id();
        let op_hash = op.op_hash(&self.inner.settlement, self.inner.chain_id);
        let (handle, ticket) = settlement_channel(op_id, op_hash);

        if self
            .inner
            .tickets
            .lock()
            .unwrap()
            .insert(op_id, ticket)
            .is_some()
        {
            warn!(
                originator = %op_id.originator,
                sequence = %op_id.sequence,
                "Replaced pending settlement for re-enqueued operation"
            );
        }
        self.inner.queue.enqueue(op);
        handle
    }

    /// Total operations waiting for a flush.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.pending_count()
    }

    /// Policy-checked flush attempt. Returns the submitted batch size, or
    /// `None` when nothing was submitted (policy unmet, queue empty, or a
    /// flush already in flight).
    pub async fn tick(&self) -> Result<Option<usize>> {
        self.flush(false).await
    }

    /// Caller-driven flush: bypasses the idle window, still respects the
    /// size threshold and the single-flush guard.
    pub async fn flush_now(&self) -> Result<Option<usize>> {
        self.flush(true).await
    }

    async fn flush(&self, manual: bool) -> Result<Option<usize>> {
        let inner = &self.inner;

        let Ok(_guard) = inner.flush_guard.try_lock() else {
            debug!("Flush already in flight");
            inner.metrics.flushes_skipped.increment(1);
            return Ok(None);
        };

        let pending = inner.queue.pending_count();
        let eligible = if manual {
            inner.policy.should_flush_now(pending)
        } else {
            inner.policy.should_flush(pending, inner.queue.idle_for())
        };
        if !eligible {
            debug!(pending, manual, "Flush policy not met");
            inner.metrics.flushes_skipped.increment(1);
            return Ok(None);
        }

        let batch = inner.queue.drain();
        if batch.is_empty() {
            inner.metrics.flushes_skipped.increment(1);
            return Ok(None);
        }

        // Hand-off: pending settlements go live before the network round
        // trip, so a quickly-mined batch cannot outrun its watchers.
        {
            let mut tickets = inner.tickets.lock().unwrap();
            for op in &batch {
                match tickets.remove(&op.id()) {
                    Some(ticket) => {
                        inner.correlator.watch(ticket);
                    }
                    None => warn!(
                        originator = %op.originator,
                        sequence = %op.sequence,
                        "No pending settlement registered for drained operation"
                    ),
                }
            }
        }

        let started = Instant::now();
        match inner.transport.submit_batch(&batch).await {
            Ok(batch_tx) => {
                inner
                    .metrics
                    .submit_duration
                    .record(started.elapsed().as_secs_f64());
                inner.metrics.batch_size.record(batch.len() as f64);
                inner.metrics.batches_submitted.increment(1);
                info!(
                    batch_tx = %batch_tx,
                    operations = batch.len(),
                    "Submitted operation batch"
                );
                Ok(Some(batch.len()))
            }
            Err(e) => {
                inner.metrics.submit_failures.increment(1);
                error!(
                    error = %e,
                    operations = batch.len(),
                    "Batch submission failed; operations are not re-enqueued"
                );
                Err(e)
            }
        }
    }

    /// Start the periodic flush timer. The task runs `tick` every `interval`
    /// until [`stop_timer`](Self::stop_timer); tick errors are logged, not
    /// fatal. No-op if a timer is already running.
    pub fn start_timer(&self, interval: Duration) {
        let mut timer = self.inner.timer.lock().unwrap();
        if timer.is_some() {
            warn!("Flush timer already running");
            return;
        }

        info!(interval_ms = interval.as_millis() as u64, "Starting flush timer");
        let scheduler = self.clone();
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.tick().await {
                    error!(error = %e, "Scheduled flush failed");
                }
            }
        }));
    }

    /// Stop the periodic flush timer, if running.
    pub fn stop_timer(&self) {
        if let Some(handle) = self.inner.timer.lock().unwrap().take() {
            handle.abort();
            info!("Stopped flush timer");
        }
    }
}
