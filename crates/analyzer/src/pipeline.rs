//! Bounded-concurrency fetch-and-classify pipeline.
//!
//! For a batch of transactions, fetches the code of every distinct recipient
//! through the [`BlockDataProvider`], classifies it against the ERC20 selector
//! table, and returns the transactions whose recipient matched.
//!
//! One task per recipient is spawned into a `JoinSet`; a semaphore caps how
//! many of them may be fetching at once. The caller drains the `JoinSet`
//! until it is empty, so the batch only completes after every task has
//! either emitted or dropped its transactions.

use alloy_primitives::Address;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{
    erc20_selectors, missing_selectors, Contract, SelectorTable, TallyError, TallyResult,
    Transaction,
};
use tally_provider::BlockDataProvider;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default max concurrent `eth_getCode` calls.
/// Set low for free-tier RPC compatibility; increase with paid RPCs.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default per-call deadline for one code fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// What a batch returns when its cancellation token fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Return the matches collected so far and flag the stats.
    #[default]
    Partial,
    /// Fail the whole batch with [`TallyError::Cancelled`].
    Fail,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub max_concurrent: usize,
    pub fetch_timeout: Duration,
    pub cancel_policy: CancelPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cancel_policy: CancelPolicy::default(),
        }
    }
}

impl ClassifierConfig {
    /// Override max concurrent fetches (default: 2).
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Override the per-call fetch deadline (default: 10s).
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    pub fn validate(&self) -> TallyResult<()> {
        if self.max_concurrent == 0 {
            return Err(TallyError::InvalidInput(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(TallyError::InvalidInput(
                "fetch timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-batch counters. Contract counts are per distinct recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub transactions: usize,
    /// Contract creations; nothing to classify.
    pub skipped: usize,
    pub contracts: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub empty: usize,
    pub failed: usize,
    /// Recipients abandoned because the batch was cancelled.
    pub abandoned: usize,
    pub cancelled: bool,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.transactions += other.transactions;
        self.skipped += other.skipped;
        self.contracts += other.contracts;
        self.matched += other.matched;
        self.mismatched += other.mismatched;
        self.empty += other.empty;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.cancelled |= other.cancelled;
    }
}

/// Matched transactions (unordered) plus counters.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub matched: Vec<Transaction>,
    pub stats: BatchStats,
}

/// Classification of a single address, for one-off lookups.
#[derive(Debug, Clone)]
pub struct ContractVerdict {
    pub contract: Contract,
    pub compatible: bool,
    pub missing: Vec<&'static str>,
}

/// Result of one recipient task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Match,
    Mismatch,
    Empty,
    Failed,
    Cancelled,
}

/// Filters transactions down to those calling ERC20-compatible contracts.
///
/// ```ignore
/// let classifier = BatchClassifier::new(provider, ClassifierConfig::default())?;
/// let outcome = classifier.classify_batch(&cancel, &block.transactions).await?;
/// ```
pub struct BatchClassifier {
    provider: Arc<dyn BlockDataProvider>,
    config: ClassifierConfig,
}

impl BatchClassifier {
    pub fn new(provider: Arc<dyn BlockDataProvider>, config: ClassifierConfig) -> TallyResult<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Returns the transactions whose recipient is ERC20-compatible.
    ///
    /// Code is fetched once per distinct recipient, so a failed fetch is
    /// logged and drops every transaction sent to that recipient. Other
    /// recipients are unaffected.
    /// On cancellation the outcome depends on [`CancelPolicy`].
    pub async fn classify_batch(
        &self,
        cancel: &CancellationToken,
        transactions: &[Transaction],
    ) -> TallyResult<BatchOutcome> {
        if transactions.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut stats = BatchStats {
            transactions: transactions.len(),
            ..BatchStats::default()
        };

        // One fetch per recipient, first-seen order.
        let mut by_recipient: IndexMap<Address, Vec<Transaction>> = IndexMap::new();
        for tx in transactions {
            match tx.to {
                Some(to) => by_recipient.entry(to).or_default().push(tx.clone()),
                None => stats.skipped += 1,
            }
        }
        stats.contracts = by_recipient.len();

        let selectors = erc20_selectors();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let fetch_timeout = self.config.fetch_timeout;

        tracing::debug!(
            txs = stats.transactions,
            contracts = stats.contracts,
            concurrency = self.config.max_concurrent,
            "classifying batch"
        );

        let mut tasks = JoinSet::new();
        for (address, txs) in by_recipient {
            let provider = Arc::clone(&self.provider);
            let sem = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = classify_recipient(
                    provider.as_ref(),
                    &sem,
                    &cancel,
                    address,
                    fetch_timeout,
                    selectors,
                )
                .await;
                (outcome, txs)
            });
        }

        // Drain: exhausted only once every task has finished.
        let mut matched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((Outcome::Match, txs)) => {
                    stats.matched += 1;
                    matched.extend(txs);
                }
                Ok((Outcome::Mismatch, _)) => stats.mismatched += 1,
                Ok((Outcome::Empty, _)) => stats.empty += 1,
                Ok((Outcome::Failed, _)) => stats.failed += 1,
                Ok((Outcome::Cancelled, _)) => stats.abandoned += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "classification task panicked");
                    stats.failed += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            stats.cancelled = true;
            tracing::warn!(
                matched = matched.len(),
                abandoned = stats.abandoned,
                policy = ?self.config.cancel_policy,
                "batch cancelled"
            );
            if self.config.cancel_policy == CancelPolicy::Fail {
                return Err(TallyError::Cancelled);
            }
        }

        tracing::debug!(
            matched_txs = matched.len(),
            matched = stats.matched,
            failed = stats.failed,
            empty = stats.empty,
            "batch done"
        );

        Ok(BatchOutcome { matched, stats })
    }

    /// Fetches and classifies a single address under the configured timeout.
    pub async fn classify_address(&self, address: Address) -> TallyResult<ContractVerdict> {
        let contract = fetch_with_timeout(
            self.provider.as_ref(),
            address,
            self.config.fetch_timeout,
        )
        .await?;

        let selectors = erc20_selectors();
        let compatible = contract.is_erc20_compatible(selectors);
        let missing = if contract.has_code() {
            missing_selectors(&contract.bytecode, selectors)
        } else {
            selectors.iter().map(|(sig, _)| sig).collect()
        };

        Ok(ContractVerdict {
            contract,
            compatible,
            missing,
        })
    }
}

async fn fetch_with_timeout(
    provider: &dyn BlockDataProvider,
    address: Address,
    fetch_timeout: Duration,
) -> TallyResult<Contract> {
    tokio::time::timeout(fetch_timeout, provider.fetch_contract_code(address))
        .await
        .map_err(|_| TallyError::Timeout(fetch_timeout))?
}

/// Worker body: wait for a slot, fetch, classify.
///
/// The permit is released when `_permit` drops, on every return path.
async fn classify_recipient(
    provider: &dyn BlockDataProvider,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
    address: Address,
    fetch_timeout: Duration,
    selectors: &SelectorTable,
) -> Outcome {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Cancelled,
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(_) => return Outcome::Cancelled,
        },
    };

    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Cancelled,
        res = fetch_with_timeout(provider, address, fetch_timeout) => res,
    };

    let contract = match fetched {
        Ok(contract) => contract,
        Err(e) => {
            tracing::warn!(%address, error = %e, "contract code fetch failed, dropping");
            return Outcome::Failed;
        }
    };

    if !contract.has_code() {
        tracing::debug!(%address, "no code at recipient");
        return Outcome::Empty;
    }

    if contract.is_erc20_compatible(selectors) {
        tracing::debug!(%address, "ERC20 compatible");
        Outcome::Match
    } else {
        tracing::trace!(
            %address,
            missing = ?missing_selectors(&contract.bytecode, selectors),
            "not ERC20 compatible"
        );
        Outcome::Mismatch
    }
}
