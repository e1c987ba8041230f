//! Matches settlement events to pending operations, racing a live
//! subscription against a one-shot fallback poll and caller cancellation.

use alloy_primitives::Address;
use opflow_core::SettlementRecord;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::metrics::CorrelatorMetrics;
use crate::pending::{SettlementError, SettlementTicket};
use crate::revert::{RevertReason, decode_revert};
use crate::source::{EventFilter, SettlementEventSource};

/// How long after subscribing the correlator issues its one-shot fallback
/// query, covering sources whose live notifications lag the log itself.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(500);

/// Spawns one watcher task per submitted operation and funnels the first
/// genuine observation into that operation's pending-settlement slot.
pub struct SettlementCorrelator<S> {
    source: Arc<S>,
    settlement: Address,
    fallback_delay: Duration,
    metrics: CorrelatorMetrics,
}

impl<S> Debug for SettlementCorrelator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementCorrelator")
            .field("settlement", &self.settlement)
            .field("fallback_delay", &self.fallback_delay)
            .finish()
    }
}

impl<S: SettlementEventSource> SettlementCorrelator<S> {
    pub fn new(source: Arc<S>, settlement: Address) -> Self {
        Self {
            source,
            settlement,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            metrics: CorrelatorMetrics::default(),
        }
    }

    pub const fn with_fallback_delay(mut self, fallback_delay: Duration) -> Self {
        self.fallback_delay = fallback_delay;
        self
    }

    /// Start watching for the settlement of `ticket`'s operation.
    ///
    /// The watcher resolves the ticket exactly once: with the first matching
    /// event above the height captured here, or with a cancellation error.
    pub fn watch(&self, ticket: SettlementTicket) -> JoinHandle<()> {
        let source = self.source.clone();
        let filter = EventFilter {
            settlement: self.settlement,
            op_id: ticket.op_id(),
        };
        let fallback_delay = self.fallback_delay;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            watch_one(source, filter, ticket, fallback_delay, metrics).await;
        })
    }
}

async fn watch_one<S: SettlementEventSource>(
    source: Arc<S>,
    filter: EventFilter,
    ticket: SettlementTicket,
    fallback_delay: Duration,
    metrics: CorrelatorMetrics,
) {
    let SettlementTicket {
        op_id,
        op_hash,
        outcome_tx,
        mut cancel_rx,
    } = ticket;

    // Dropping `outcome_tx` on any early return reports `Abandoned` to the
    // waiter instead of guessing a height of zero, which would let replayed
    // historical events through the staleness guard.
    let subscribed_at = match source.block_height().await {
        Ok(height) => height,
        Err(e) => {
            error!(
                originator = %op_id.originator,
                sequence = %op_id.sequence,
                error = %e,
                "Failed to read block height; abandoning settlement watch"
            );
            return;
        }
    };

    let mut subscription = match source.subscribe(&filter).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(
                originator = %op_id.originator,
                sequence = %op_id.sequence,
                error = %e,
                "Failed to subscribe to settlement events; abandoning watch"
            );
            return;
        }
    };

    let fallback = sleep(fallback_delay);
    tokio::pin!(fallback);
    let mut fallback_pending = true;

    let event = loop {
        tokio::select! {
            observed = subscription.recv() => {
                match observed {
                    Some(event) if event.block_number > subscribed_at => break event,
                    Some(event) => {
                        metrics.stale_events.increment(1);
                        debug!(
                            originator = %op_id.originator,
                            sequence = %op_id.sequence,
                            block_number = event.block_number,
                            subscribed_at,
                            "Discarding stale settlement event"
                        );
                    }
                    None => {
                        warn!(
                            originator = %op_id.originator,
                            sequence = %op_id.sequence,
                            "Event source closed the subscription before resolution"
                        );
                        return;
                    }
                }
            }
            _ = &mut fallback, if fallback_pending => {
                fallback_pending = false;
                match source.query(&filter, subscribed_at + 1).await {
                    Ok(events) => {
                        if let Some(event) = events
                            .into_iter()
                            .find(|event| event.block_number > subscribed_at)
                        {
                            break event;
                        }
                    }
                    Err(e) => {
                        warn!(
                            originator = %op_id.originator,
                            sequence = %op_id.sequence,
                            error = %e,
                            "Fallback settlement query failed"
                        );
                    }
                }
            }
            changed = cancel_rx.changed() => {
                // An error means the caller dropped its handle entirely;
                // either way there is nobody left to resolve for.
                if changed.is_err() || *cancel_rx.borrow() {
                    metrics.cancelled.increment(1);
                    debug!(
                        originator = %op_id.originator,
                        sequence = %op_id.sequence,
                        "Settlement watch cancelled"
                    );
                    let _ = outcome_tx.send(Err(SettlementError::Cancelled));
                    return;
                }
            }
        }
    };

    // First genuine observation wins; release the subscription before the
    // (possibly slow) reason lookup.
    drop(subscription);

    if event.success {
        metrics.settled.increment(1);
        info!(
            originator = %op_id.originator,
            sequence = %op_id.sequence,
            block_number = event.block_number,
            actual_gas_used = event.actual_gas_used,
            "Operation settled"
        );
        // Resolve under the hash the operation was submitted with, not
        // whatever hash the source echoed back.
        let mut record = SettlementRecord::from_event(&event);
        record.op_hash = op_hash;
        let _ = outcome_tx.send(Ok(record));
        return;
    }

    let raw = match event.revert_data.clone() {
        Some(bytes) => Some(bytes),
        None => match source.revert_reason(&filter, event.block_number).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    originator = %op_id.originator,
                    sequence = %op_id.sequence,
                    block_number = event.block_number,
                    error = %e,
                    "Revert reason lookup failed"
                );
                None
            }
        },
    };

    match raw {
        Some(data) => {
            let reason =
                decode_revert(&data, true).unwrap_or_else(|| RevertReason::Raw(data.clone()));
            metrics.reverted.increment(1);
            info!(
                originator = %op_id.originator,
                sequence = %op_id.sequence,
                block_number = event.block_number,
                reason = %reason,
                "Operation settlement reverted"
            );
            let _ = outcome_tx.send(Err(SettlementError::Reverted(reason)));
        }
        None => {
            metrics.reverted.increment(1);
            info!(
                originator = %op_id.originator,
                sequence = %op_id.sequence,
                block_number = event.block_number,
                "Operation settled unsuccessfully with no revert reason"
            );
            let mut record = SettlementRecord::from_event(&event);
            record.op_hash = op_hash;
            let _ = outcome_tx.send(Ok(record));
        }
    }
}
