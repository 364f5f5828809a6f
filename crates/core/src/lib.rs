//! Domain models, selector derivation, bytecode classification and errors.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod classifier;
pub mod error;
pub mod selectors;
pub mod types;

pub use classifier::{is_erc20_compatible, missing_selectors};
pub use error::{TallyError, TallyResult};
pub use selectors::{build_erc20_selectors, erc20_selectors, signature_selector, SelectorTable};
pub use types::{ActiveResult, Block, Contract, Transaction};
