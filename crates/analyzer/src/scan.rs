//! Multi-block scan: classify each block, then count activity in block order.

use crate::activity::ActivityCounter;
use crate::pipeline::{BatchClassifier, BatchStats, CancelPolicy};
use alloy_primitives::B256;
use std::collections::HashSet;
use tally_core::{Block, TallyError, TallyResult};
use tokio_util::sync::CancellationToken;

/// Everything a scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub counter: ActivityCounter,
    pub blocks_scanned: usize,
    pub newest_block: Option<u64>,
    pub oldest_block: Option<u64>,
    pub erc20_txs: usize,
    pub stats: BatchStats,
}

/// Classifies `blocks` one batch at a time and feeds matches to a fresh
/// [`ActivityCounter`].
///
/// Matches come back from the pipeline in completion order; they are
/// replayed in block order so the counter's first-seen tie-break does not
/// depend on network timing. Stops after the first cancelled batch; under
/// [`CancelPolicy::Fail`] a cancellation between batches is an error too.
pub async fn scan_blocks(
    classifier: &BatchClassifier,
    cancel: &CancellationToken,
    blocks: &[Block],
) -> TallyResult<ScanOutcome> {
    let mut out = ScanOutcome::default();

    for (i, block) in blocks.iter().enumerate() {
        if cancel.is_cancelled() {
            if classifier.config().cancel_policy == CancelPolicy::Fail {
                return Err(TallyError::Cancelled);
            }
            out.stats.cancelled = true;
            break;
        }

        let batch = classifier
            .classify_batch(cancel, &block.transactions)
            .await?;

        let matched: HashSet<B256> = batch.matched.iter().map(|tx| tx.hash).collect();
        out.counter.record_all(
            block
                .transactions
                .iter()
                .filter(|tx| matched.contains(&tx.hash)),
        );

        tracing::info!(
            index = i,
            block = block.number,
            txs = block.transactions.len(),
            erc20 = batch.matched.len(),
            failed = batch.stats.failed,
            "block classified"
        );

        out.erc20_txs += batch.matched.len();
        out.stats.merge(&batch.stats);
        out.blocks_scanned += 1;
        out.newest_block = Some(out.newest_block.map_or(block.number, |n| n.max(block.number)));
        out.oldest_block = Some(out.oldest_block.map_or(block.number, |n| n.min(block.number)));

        if batch.stats.cancelled {
            break;
        }
    }

    Ok(out)
}
