//! JSON-RPC provider backed by alloy-rs.

use crate::config::ProviderConfig;
use crate::BlockDataProvider;
use alloy_primitives::Address;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_transport::{RpcError, TransportError, TransportErrorKind, TransportResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tally_core::{Block, Contract, TallyError, TallyResult, Transaction};

/// Max retry attempts for 429 errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Fetches blocks and contract code from an Ethereum JSON-RPC endpoint.
///
/// ```ignore
/// let config = ProviderConfig::default().with_api_key(key);
/// let provider = RpcProvider::connect(&config).await?;
/// ```
pub struct RpcProvider {
    provider: DynProvider,
    /// Host only; the full URL may carry an API key.
    host: String,
}

impl RpcProvider {
    pub async fn connect(config: &ProviderConfig) -> TallyResult<Self> {
        let url = config.resolve_url()?;
        let host = url.host_str().unwrap_or("unknown").to_string();

        let provider = ProviderBuilder::new()
            .connect(url.as_str())
            .await
            .map_err(|e| TallyError::Network(format!("Failed to connect to {host}: {e}")))?;

        tracing::info!(host = %host, "connected");

        Ok(Self {
            provider: provider.erased(),
            host,
        })
    }
}

#[async_trait]
impl BlockDataProvider for RpcProvider {
    async fn fetch_contract_code(&self, address: Address) -> TallyResult<Contract> {
        let provider = &self.provider;
        let code = with_retry("eth_getCode", move || async move {
            provider.get_code_at(address).await
        })
        .await?;

        tracing::trace!(%address, code_len = code.len(), "fetched code");
        Ok(Contract::from_code(address, &code))
    }

    async fn fetch_recent_blocks(&self, count: usize) -> TallyResult<Vec<Block>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let latest = self.latest_block_number().await?;
        // Never walk past genesis.
        let take = (count as u64).min(latest + 1);

        let mut blocks = Vec::with_capacity(take as usize);
        for number in (latest + 1 - take..=latest).rev() {
            blocks.push(self.fetch_block(number).await?);
        }

        tracing::info!(
            blocks = blocks.len(),
            newest = latest,
            host = %self.host,
            "fetched recent blocks"
        );
        Ok(blocks)
    }

    async fn latest_block_number(&self) -> TallyResult<u64> {
        let provider = &self.provider;
        with_retry("eth_blockNumber", move || async move {
            provider.get_block_number().await
        })
        .await
    }
}

impl RpcProvider {
    async fn fetch_block(&self, number: u64) -> TallyResult<Block> {
        use alloy_consensus::transaction::Transaction as TxTrait;
        use alloy_eips::BlockNumberOrTag;

        tracing::debug!(block_number = number, host = %self.host, "fetching block");

        let provider = &self.provider;
        let block = with_retry("eth_getBlockByNumber", move || async move {
            provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .full()
                .await
        })
        .await?
        .ok_or_else(|| TallyError::Remote {
            code: 0,
            message: format!("block {number} not found"),
        })?;

        let hash = block.header.hash;
        let transactions: Vec<Transaction> = block
            .transactions
            .into_transactions()
            .map(|tx| Transaction {
                hash: *tx.inner.tx_hash(),
                from: tx.inner.signer(),
                to: tx.to(),
                input: tx.input().clone(),
                value: tx.value(),
                gas: tx.gas_limit(),
            })
            .collect();

        tracing::debug!(block_number = number, txs = transactions.len(), "fetched block");
        Ok(Block {
            number,
            hash,
            transactions,
        })
    }
}

/// Runs `op`, retrying with exponential backoff while the node answers 429.
async fn with_retry<T, F, Fut>(method: &'static str, mut op: F) -> TallyResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_rate_limited(&e) && attempt < MAX_RETRIES => {
                tracing::debug!(method, attempt, "rate limited, backing off");
            }
            Err(e) => return Err(map_rpc_error(e)),
        }
    }
    Err(TallyError::Network(format!(
        "{method}: max retries exceeded"
    )))
}

fn is_rate_limited(e: &TransportError) -> bool {
    match e {
        RpcError::Transport(TransportErrorKind::HttpError(http)) => http.status == 429,
        RpcError::ErrorResp(payload) => payload.code == 429,
        _ => false,
    }
}

/// Maps alloy's error onto the fetch-failure taxonomy.
fn map_rpc_error(e: TransportError) -> TallyError {
    match e {
        RpcError::ErrorResp(payload) => TallyError::Remote {
            code: payload.code,
            message: payload.message.to_string(),
        },
        other => TallyError::Network(other.to_string()),
    }
}
