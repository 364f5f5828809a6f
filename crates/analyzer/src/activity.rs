//! Per-address activity counting and top-K extraction.

use alloy_primitives::Address;
use indexmap::IndexMap;
use tally_core::{ActiveResult, Transaction};

/// Counts how often each address appears as sender or recipient of a
/// matched transaction.
///
/// Owned by a single caller; never shared with pipeline workers. Addresses
/// keep their first-seen position, which is the tie-break for ranking.
#[derive(Debug, Clone, Default)]
pub struct ActivityCounter {
    counts: IndexMap<Address, u64>,
}

impl ActivityCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `from`, then `to`. Two independent increments.
    pub fn record_transaction(&mut self, tx: &Transaction) {
        self.bump(tx.from);
        if let Some(to) = tx.to {
            self.bump(to);
        }
    }

    pub fn record_all<'a>(&mut self, txs: impl IntoIterator<Item = &'a Transaction>) {
        for tx in txs {
            self.record_transaction(tx);
        }
    }

    #[inline]
    fn bump(&mut self, address: Address) {
        *self.counts.entry(address).or_insert(0) += 1;
    }

    pub fn count(&self, address: &Address) -> u64 {
        self.counts.get(address).copied().unwrap_or(0)
    }

    /// Number of distinct addresses seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The `k` most active addresses, highest count first.
    ///
    /// `k` is clamped to [`len`](Self::len). Equal counts keep first-seen
    /// order.
    pub fn top_k(&self, k: usize) -> Vec<ActiveResult> {
        let k = k.min(self.counts.len());
        if k == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(&Address, &u64)> = self.counts.iter().collect();
        // `sort_by` is stable, so insertion order survives among ties.
        ranked.sort_by(|a, b| b.1.cmp(a.1));

        ranked
            .into_iter()
            .take(k)
            .map(|(address, count)| ActiveResult {
                address: *address,
                activity_count: *count,
            })
            .collect()
    }
}
