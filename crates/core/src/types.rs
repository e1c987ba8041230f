//! Meta-operation and settlement value types.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use serde::{Deserialize, Serialize};

/// A user-signed meta-operation, consumed as an opaque signed record.
///
/// The relay only interprets `originator` and `sequence` (the correlation
/// key); everything else is carried through to the settlement contract
/// untouched. Signature validity is the signing layer's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOperation {
    pub originator: Address,
    pub sequence: U256,
    pub payload: Bytes,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub signature: Bytes,
}

impl SignedOperation {
    /// Correlation key for this operation.
    pub const fn id(&self) -> OpId {
        OpId {
            originator: self.originator,
            sequence: self.sequence,
        }
    }

    /// Content hash of the operation, bound to a settlement contract and
    /// chain. Stable pre-submission, unlike any transaction hash.
    pub fn op_hash(&self, settlement: &Address, chain_id: u64) -> B256 {
        let mut data = Vec::new();

        data.extend_from_slice(&chain_id.to_be_bytes());
        data.extend_from_slice(settlement.as_slice());
        data.extend_from_slice(self.originator.as_slice());
        data.extend_from_slice(&self.sequence.to_be_bytes::<32>());
        data.extend_from_slice(&keccak256(&self.payload).0);
        data.extend_from_slice(&self.max_fee_per_gas.to_be_bytes::<32>());
        data.extend_from_slice(&self.max_priority_fee_per_gas.to_be_bytes::<32>());

        keccak256(&data)
    }
}

/// Correlation key: the `(originator, sequence)` pair that ties a settlement
/// event back to the operation submitted for it.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpId {
    pub originator: Address,
    pub sequence: U256,
}

/// One observation from the ledger's event log for a settled operation.
///
/// Populated by a `SettlementEventSource` implementation at the boundary;
/// malformed log entries are rejected there, never propagated inward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementEvent {
    pub op_id: OpId,
    pub op_hash: B256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: u64,
    pub block_number: u64,
    /// Raw failure bytes, when the event carries them inline. Sources that
    /// emit the reason as a separate event leave this `None` and answer the
    /// correlator's reason lookup instead.
    pub revert_data: Option<Bytes>,
}

/// The settlement outcome delivered to a waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub op_id: OpId,
    pub op_hash: B256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: u64,
    pub block_number: u64,
}

impl SettlementRecord {
    /// Build a record from the event that settled the operation.
    pub const fn from_event(event: &SettlementEvent) -> Self {
        Self {
            op_id: event.op_id,
            op_hash: event.op_hash,
            success: event.success,
            actual_gas_cost: event.actual_gas_cost,
            actual_gas_used: event.actual_gas_used,
            block_number: event.block_number,
        }
    }
}
