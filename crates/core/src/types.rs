//! Domain types for the Tally activity scanner.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::selectors::SelectorTable;

// ---------------------------------------------------------------------------
// Chain data
// ---------------------------------------------------------------------------

/// Lightweight EVM transaction -- only the fields the scanner needs.
///
/// Identity is `hash`. `to` is `None` for contract creations, which the
/// classification pipeline skips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    /// `Bytes` (ref-counted) so cloning into worker tasks stays cheap.
    pub input: Bytes,
    pub value: U256,
    pub gas: u64,
}

/// A block with its transactions in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub transactions: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Deployed code at an address, as lowercase hex without the `0x` prefix.
///
/// `bytecode` is empty when the address holds no code (an EOA).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: Address,
    pub bytecode: String,
}

impl Contract {
    /// Builds a contract from raw code bytes.
    pub fn from_code(address: Address, code: &[u8]) -> Self {
        Self {
            address,
            bytecode: hex::encode(code),
        }
    }

    pub fn has_code(&self) -> bool {
        !self.bytecode.is_empty()
    }

    pub fn is_erc20_compatible(&self, selectors: &SelectorTable) -> bool {
        crate::classifier::is_erc20_compatible(&self.bytecode, selectors)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// One row of the activity ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveResult {
    pub address: Address,
    pub activity_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_from_code_is_unprefixed_lowercase() {
        let c = Contract::from_code(Address::ZERO, &[0x60, 0x80, 0xAB]);
        assert_eq!(c.bytecode, "6080ab");
        assert!(c.has_code());
    }

    #[test]
    fn empty_code_means_no_contract() {
        let c = Contract::from_code(Address::ZERO, &[]);
        assert!(!c.has_code());
        assert!(!c.is_erc20_compatible(crate::erc20_selectors()));
    }
}
