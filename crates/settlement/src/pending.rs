//! Pending-settlement handles: the caller-facing half of a submitted
//! operation, completed exactly once by the correlator.

use alloy_primitives::B256;
use opflow_core::{OpId, SettlementRecord};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use crate::revert::RevertReason;

/// Terminal failure of a pending settlement, distinguishable by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The operation settled on chain but its execution reverted.
    Reverted(RevertReason),
    /// The caller gave up before the operation settled.
    Cancelled,
    /// The relay stopped watching without resolving: the subscription could
    /// not be established, or the pending entry was replaced by a re-enqueue
    /// of the same correlation key.
    Abandoned,
}

impl std::fmt::Display for SettlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reverted(reason) => write!(f, "operation reverted: {reason}"),
            Self::Cancelled => write!(f, "settlement wait cancelled"),
            Self::Abandoned => write!(f, "settlement watcher abandoned the operation"),
        }
    }
}

impl std::error::Error for SettlementError {}

/// What a waiter eventually receives.
pub type SettlementOutcome = Result<SettlementRecord, SettlementError>;

/// Caller side of a pending settlement.
#[derive(Debug)]
pub struct SettlementHandle {
    op_id: OpId,
    op_hash: B256,
    outcome_rx: oneshot::Receiver<SettlementOutcome>,
    cancel: Arc<watch::Sender<bool>>,
}

/// Cancels a pending settlement from outside the waiting task, e.g. from a
/// caller-owned timeout racing the wait.
#[derive(Debug, Clone)]
pub struct SettlementCanceller {
    op_id: OpId,
    cancel: Arc<watch::Sender<bool>>,
}

impl SettlementCanceller {
    /// Request cancellation. No effect once the settlement has resolved.
    pub fn cancel(&self) {
        tracing::debug!(
            originator = %self.op_id.originator,
            sequence = %self.op_id.sequence,
            "Cancelling pending settlement"
        );
        self.cancel.send_replace(true);
    }
}

impl SettlementHandle {
    pub const fn op_id(&self) -> OpId {
        self.op_id
    }

    /// Content hash the operation was submitted under.
    pub const fn op_hash(&self) -> B256 {
        self.op_hash
    }

    /// Detach a canceller usable while `wait` is outstanding.
    pub fn canceller(&self) -> SettlementCanceller {
        SettlementCanceller {
            op_id: self.op_id,
            cancel: self.cancel.clone(),
        }
    }

    /// Request cancellation without consuming the handle.
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Wait for the settlement outcome.
    ///
    /// Suspends the calling task until the correlator resolves the operation
    /// or cancellation is requested. A delivered outcome wins over a
    /// simultaneous cancellation.
    pub async fn wait(mut self) -> SettlementOutcome {
        let mut cancelled = self.cancel.subscribe();
        tokio::select! {
            biased;
            outcome = &mut self.outcome_rx => {
                outcome.unwrap_or(Err(SettlementError::Abandoned))
            }
            _ = wait_cancelled(&mut cancelled) => Err(SettlementError::Cancelled),
        }
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    // `subscribe` marks the current value seen, so a cancellation that
    // happened before `wait` must be picked up from the borrow.
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender gone without cancelling: resolution (or abandonment) is on the
    // oneshot path, so park forever and let the other select arm win.
    std::future::pending::<()>().await;
}

/// Correlator side of a pending settlement: a single-assignment outcome slot
/// plus the cancellation signal.
#[derive(Debug)]
pub struct SettlementTicket {
    pub(crate) op_id: OpId,
    pub(crate) op_hash: B256,
    pub(crate) outcome_tx: oneshot::Sender<SettlementOutcome>,
    pub(crate) cancel_rx: watch::Receiver<bool>,
}

impl SettlementTicket {
    pub const fn op_id(&self) -> OpId {
        self.op_id
    }
}

/// Create the two halves of a pending settlement.
pub fn settlement_channel(op_id: OpId, op_hash: B256) -> (SettlementHandle, SettlementTicket) {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel = Arc::new(cancel_tx);

    (
        SettlementHandle {
            op_id,
            op_hash,
            outcome_rx,
            cancel,
        },
        SettlementTicket {
            op_id,
            op_hash,
            outcome_tx,
            cancel_rx,
        },
    )
}
