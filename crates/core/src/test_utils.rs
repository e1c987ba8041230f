//! Fixtures shared across the workspace's tests.

use alloy_primitives::{Address, B256, Bytes, U256};

use crate::types::{OpId, SettlementEvent, SignedOperation};

/// Build a signed operation for an originator derived from `originator_tag`.
pub fn create_test_operation(originator_tag: u8, sequence: u64) -> SignedOperation {
    let mut bytes = [0u8; 20];
    bytes[19] = originator_tag;

    SignedOperation {
        originator: Address::from(bytes),
        sequence: U256::from(sequence),
        payload: Bytes::from(vec![originator_tag, sequence as u8]),
        max_fee_per_gas: U256::from(1_000_000_000u64),
        max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        signature: Bytes::from(vec![0u8; 65]),
    }
}

/// Build a settlement event for `op_id` at `block_number`.
pub fn create_settlement_event(op_id: OpId, success: bool, block_number: u64) -> SettlementEvent {
    SettlementEvent {
        op_id,
        op_hash: B256::with_last_byte(op_id.sequence.byte(0)),
        success,
        actual_gas_cost: U256::from(42_000u64),
        actual_gas_used: 42_000,
        block_number,
        revert_data: None,
    }
}
