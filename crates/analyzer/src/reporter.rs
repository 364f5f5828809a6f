//! Activity report generator.
//!
//! Takes a [`ScanOutcome`] and produces a human-readable summary with the
//! ranked addresses, labelled where the address is well known.

use crate::pipeline::BatchStats;
use crate::scan::ScanOutcome;
use std::time::Duration;
use tally_core::ActiveResult;

/// Report produced from one scan.
#[derive(Debug)]
pub struct Report {
    pub blocks_scanned: usize,
    pub newest_block: Option<u64>,
    pub oldest_block: Option<u64>,
    pub erc20_txs: usize,
    pub distinct_addresses: usize,
    pub stats: BatchStats,
    pub top: Vec<RankedAddress>,
    pub fetch_time: Duration,
    pub total_time: Duration,
}

/// One ranked address with its label.
#[derive(Debug)]
pub struct RankedAddress {
    pub result: ActiveResult,
    pub label: String,
}

impl Report {
    /// Build a report from a finished scan and its top-K ranking.
    pub fn build(
        scan: &ScanOutcome,
        top: &[ActiveResult],
        fetch_time: Duration,
        total_time: Duration,
    ) -> Self {
        let top = top
            .iter()
            .map(|r| RankedAddress {
                result: *r,
                label: tally_provider::labels::display_name(&r.address),
            })
            .collect();

        Report {
            blocks_scanned: scan.blocks_scanned,
            newest_block: scan.newest_block,
            oldest_block: scan.oldest_block,
            erc20_txs: scan.erc20_txs,
            distinct_addresses: scan.counter.len(),
            stats: scan.stats,
            top,
            fetch_time,
            total_time,
        }
    }

    fn block_range(&self) -> String {
        match (self.oldest_block, self.newest_block) {
            (Some(lo), Some(hi)) if lo == hi => lo.to_string(),
            (Some(lo), Some(hi)) => format!("{lo}..={hi}"),
            _ => "-".to_string(),
        }
    }

    /// Render the report as a formatted string.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                  TALLY ERC20 ACTIVITY REPORT                 ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str(&format!("║  Blocks:             {:>39} ║\n", self.block_range()));
        out.push_str(&format!(
            "║  Transactions:       {:>39} ║\n",
            self.stats.transactions
        ));
        out.push_str(&format!("║  ERC20 txs:          {:>39} ║\n", self.erc20_txs));
        out.push_str(&format!(
            "║  Contracts checked:  {:>39} ║\n",
            self.stats.contracts
        ));
        out.push_str(&format!(
            "║  ERC20 contracts:    {:>39} ║\n",
            self.stats.matched
        ));
        out.push_str(&format!("║  Fetch failures:     {:>39} ║\n", self.stats.failed));
        out.push_str(&format!(
            "║  Distinct addresses: {:>39} ║\n",
            self.distinct_addresses
        ));
        out.push_str(&format!(
            "║  Fetch time:         {:>39} ║\n",
            format!("{:?}", self.fetch_time)
        ));
        out.push_str(&format!(
            "║  Total time:         {:>39} ║\n",
            format!("{:?}", self.total_time)
        ));
        if self.stats.cancelled {
            out.push_str("║  Scan was cancelled; results are partial.                    ║\n");
        }
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.top.is_empty() {
            out.push_str("║  No ERC20 activity found.                                    ║\n");
        } else {
            out.push_str("║  MOST ACTIVE ADDRESSES                                       ║\n");
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

            for (i, ranked) in self.top.iter().enumerate() {
                let row = format!(
                    "{:>2}. {}  {:>6} txs",
                    i + 1,
                    ranked.result.address,
                    ranked.result.activity_count
                );
                out.push_str(&format!("║  {row:<59} ║\n"));
                if ranked.label != ranked.result.address.to_string() {
                    // Clipped to the box interior.
                    let label: String = ranked.label.chars().take(55).collect();
                    out.push_str(&format!("║      {label:<55} ║\n"));
                }
            }
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}
