//! Seam to the layer that signs and broadcasts the batch transaction.

use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use opflow_core::SignedOperation;

/// Submits one batch of operations as a single settlement-contract call.
///
/// The returned hash identifies the batch transaction and is used for
/// logging only; per-operation outcomes are learned exclusively through the
/// settlement event source. An `Err` is the one signal that aborts a flush.
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    async fn submit_batch(&self, batch: &[SignedOperation]) -> Result<B256>;
}
