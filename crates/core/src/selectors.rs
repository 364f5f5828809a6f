//! Method and event selector derivation.
//!
//! A selector is the first four bytes of the keccak-256 hash of a canonical
//! signature such as `transfer(address,uint256)`. Deployed bytecode embeds
//! method selectors in its dispatcher and event topics in its `LOG` calls,
//! which is what the classifier looks for.

use alloy_primitives::keccak256;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// ERC20 methods: `(name, parameter types)`.
const ERC20_METHODS: &[(&str, &[&str])] = &[
    ("totalSupply", &[]),
    ("balanceOf", &["address"]),
    ("transfer", &["address", "uint256"]),
    ("transferFrom", &["address", "address", "uint256"]),
    ("approve", &["address", "uint256"]),
    ("allowance", &["address", "address"]),
];

/// ERC20 events. Only the leading four bytes of the topic are kept.
const ERC20_EVENTS: &[(&str, &[&str])] = &[
    ("Transfer", &["address", "address", "uint256"]),
    ("Approval", &["address", "address", "uint256"]),
];

/// Immutable `signature -> selector` mapping.
///
/// Backed by a `BTreeMap` so iteration order (and therefore log output) is
/// stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorTable {
    entries: BTreeMap<String, String>,
}

impl SelectorTable {
    pub fn get(&self, signature: &str) -> Option<&str> {
        self.entries.get(signature).map(String::as_str)
    }

    /// `(signature, selector)` pairs in signature order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(sig, sel)| (sig.as_str(), sel.as_str()))
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for SelectorTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Canonical signature string: `name(t1,t2,...)` with no whitespace.
pub fn canonical_signature(name: &str, params: &[&str]) -> String {
    format!("{name}({})", params.join(","))
}

/// Selector for `name(params...)` as 8 lowercase hex characters.
///
/// ```
/// assert_eq!(tally_core::signature_selector("setCount", &["uint32"]), "4ff3eaa4");
/// ```
pub fn signature_selector(name: &str, params: &[&str]) -> String {
    let hash = keccak256(canonical_signature(name, params).as_bytes());
    hex::encode(&hash[..4])
}

/// Builds the table of the six ERC20 methods and two ERC20 events.
pub fn build_erc20_selectors() -> SelectorTable {
    ERC20_METHODS
        .iter()
        .chain(ERC20_EVENTS)
        .map(|(name, params)| {
            (
                canonical_signature(name, params),
                signature_selector(name, params),
            )
        })
        .collect()
}

/// Process-wide ERC20 table, built on first use and shared read-only.
pub fn erc20_selectors() -> &'static SelectorTable {
    &ERC20_SELECTORS
}

static ERC20_SELECTORS: LazyLock<SelectorTable> = LazyLock::new(build_erc20_selectors);
