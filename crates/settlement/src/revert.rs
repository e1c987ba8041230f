//! Classification of raw failure bytes returned by the settlement contract.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{Panic, Revert, SolError, sol};
use serde::{Deserialize, Serialize};

sol! {
    /// Structured per-operation failure emitted by the settlement contract.
    error FailedOp(uint256 opIndex, address paymaster, string reason);
}

/// Decoded failure reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertReason {
    /// Plain `Error(string)` revert.
    Error(String),
    /// Per-operation failure with the index of the failed operation, the
    /// responsible party when one was named, and a message.
    FailedOp {
        index: u64,
        paymaster: Option<Address>,
        message: String,
    },
    /// `Panic(uint256)` runtime failure, named when the code is a standard
    /// Solidity panic code.
    Panic(String),
    /// Unrecognized encoding, carried through verbatim.
    Raw(Bytes),
}

impl std::fmt::Display for RevertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(message) => write!(f, "{message}"),
            Self::FailedOp {
                index,
                paymaster,
                message,
            } => match paymaster {
                Some(paymaster) => write!(f, "FailedOp({index}, {paymaster}, {message})"),
                None => write!(f, "FailedOp({index}, {message})"),
            },
            Self::Panic(code) => write!(f, "panic: {code}"),
            Self::Raw(bytes) => write!(f, "unrecognized revert data: {bytes}"),
        }
    }
}

/// Classify raw failure bytes into a [`RevertReason`].
///
/// Total over its input: unrecognized or truncated data degrades to
/// `Raw` (when `keep_raw`) or `None`, never an error.
pub fn decode_revert(data: &[u8], keep_raw: bool) -> Option<RevertReason> {
    if let Some(selector) = data.first_chunk::<4>() {
        if *selector == Revert::SELECTOR {
            if let Ok(revert) = Revert::abi_decode(data) {
                return Some(RevertReason::Error(revert.reason));
            }
        } else if *selector == FailedOp::SELECTOR {
            if let Ok(failed) = FailedOp::abi_decode(data) {
                return Some(RevertReason::FailedOp {
                    index: u64::try_from(failed.opIndex).unwrap_or(u64::MAX),
                    paymaster: (failed.paymaster != Address::ZERO).then_some(failed.paymaster),
                    message: failed.reason,
                });
            }
        } else if *selector == Panic::SELECTOR {
            if let Ok(panic) = Panic::abi_decode(data) {
                return Some(RevertReason::Panic(panic_code_name(panic.code)));
            }
        }
    }

    keep_raw.then(|| RevertReason::Raw(Bytes::copy_from_slice(data)))
}

fn panic_code_name(code: U256) -> String {
    let name = match u64::try_from(code) {
        Ok(0x00) => "generic",
        Ok(0x01) => "assertion failed",
        Ok(0x11) => "arithmetic overflow/underflow",
        Ok(0x12) => "division or modulo by zero",
        Ok(0x21) => "invalid enum conversion",
        Ok(0x22) => "corrupted storage byte array",
        Ok(0x31) => "pop on empty array",
        Ok(0x32) => "array index out of bounds",
        Ok(0x41) => "out of memory",
        Ok(0x51) => "uninitialized function pointer",
        _ => return format!("0x{code:x}"),
    };
    name.to_string()
}
