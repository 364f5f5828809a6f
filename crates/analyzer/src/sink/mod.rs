//! Data sinks for scan results.
//!
//! Two row schemas:
//! - [`ScanSummaryRow`]: one per scan
//! - [`ActivityRow`]: one per ranked address
//!
//! Backend: **NDJSON stream**: newline-delimited JSON rows to any `Write` impl.

pub mod json_stream;

use crate::reporter::Report;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

/// One row per scan: summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummaryRow {
    pub newest_block: Option<u64>,
    pub oldest_block: Option<u64>,
    pub blocks_scanned: u32,
    pub total_txs: u32,
    pub erc20_txs: u32,
    pub contracts_checked: u32,
    pub erc20_contracts: u32,
    pub fetch_failures: u32,
    pub distinct_addresses: u32,
    pub cancelled: bool,
    pub fetch_time_ms: u64,
    pub total_time_ms: u64,
    /// Unix seconds.
    pub created_at: u64,
}

/// One row per ranked address.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub rank: u32,
    pub address: String,
    pub label: Option<String>,
    pub activity_count: u64,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Builder: Report → Rows
// ---------------------------------------------------------------------------

impl Report {
    /// Flatten the report into sink-ready rows.
    pub fn to_rows(&self) -> (ScanSummaryRow, Vec<ActivityRow>) {
        let now = unix_now();

        let summary = ScanSummaryRow {
            newest_block: self.newest_block,
            oldest_block: self.oldest_block,
            blocks_scanned: self.blocks_scanned as u32,
            total_txs: self.stats.transactions as u32,
            erc20_txs: self.erc20_txs as u32,
            contracts_checked: self.stats.contracts as u32,
            erc20_contracts: self.stats.matched as u32,
            fetch_failures: self.stats.failed as u32,
            distinct_addresses: self.distinct_addresses as u32,
            cancelled: self.stats.cancelled,
            fetch_time_ms: self.fetch_time.as_millis() as u64,
            total_time_ms: self.total_time.as_millis() as u64,
            created_at: now,
        };

        let rows = self
            .top
            .iter()
            .enumerate()
            .map(|(i, ranked)| ActivityRow {
                rank: i as u32 + 1,
                address: ranked.result.address.to_string(),
                label: tally_provider::labels::lookup(&ranked.result.address)
                    .map(|l| format!("{} / {}", l.protocol, l.name)),
                activity_count: ranked.result.activity_count,
                created_at: now,
            })
            .collect();

        (summary, rows)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
