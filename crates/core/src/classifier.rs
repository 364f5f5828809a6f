//! Bytecode-level ERC20 detection.
//!
//! Heuristic: a contract is considered ERC20-compatible when its hex bytecode
//! contains every selector of the table as a literal substring. Proxies that
//! delegate to an implementation are missed, and unrelated contracts that
//! happen to contain all selectors are accepted.

use crate::selectors::SelectorTable;

/// True iff `bytecode` is non-empty and contains every selector in `selectors`.
pub fn is_erc20_compatible(bytecode: &str, selectors: &SelectorTable) -> bool {
    if bytecode.is_empty() {
        return false;
    }
    selectors.selectors().all(|sel| bytecode.contains(sel))
}

/// Signatures whose selector does not occur in `bytecode`.
pub fn missing_selectors<'a>(bytecode: &str, selectors: &'a SelectorTable) -> Vec<&'a str> {
    selectors
        .iter()
        .filter(|(_, sel)| !bytecode.contains(sel))
        .map(|(sig, _)| sig)
        .collect()
}
