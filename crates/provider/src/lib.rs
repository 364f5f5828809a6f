//! Data provider abstraction and JSON-RPC backend for Tally.

pub mod config;
pub mod labels;
pub mod rpc;

use alloy_primitives::Address;
use async_trait::async_trait;
use tally_core::{Block, Contract, TallyResult};

pub use config::ProviderConfig;
pub use rpc::RpcProvider;

/// Abstraction for fetching chain data from any source.
///
/// Implementations must be cheap to share across tasks; the classification
/// pipeline holds one behind an `Arc` and calls it concurrently.
#[async_trait]
pub trait BlockDataProvider: Send + Sync {
    /// Deployed code at `address`. An empty bytecode string means the
    /// address holds no code.
    ///
    /// Fails with `Network`, `Timeout` or `Remote`.
    async fn fetch_contract_code(&self, address: Address) -> TallyResult<Contract>;

    /// Up to `count` of the most recent blocks, newest first.
    async fn fetch_recent_blocks(&self, count: usize) -> TallyResult<Vec<Block>>;

    async fn latest_block_number(&self) -> TallyResult<u64>;
}
