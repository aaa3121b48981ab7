//! Incremental transfer scan

use crate::error::Result;
use crate::HolderIndexer;
use gcab_core::{Address, Clock, TransferEvent};
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Summary of one scan run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub latest_block: u64,
    /// Next block to scan after this run
    pub cursor: u64,
    pub blocks_scanned: u64,
    pub windows: u64,
    /// Distinct addresses whose balance was written
    pub addresses_touched: u64,
    /// First block of the window that failed, if the run stopped early
    pub aborted_at: Option<u64>,
    pub elapsed_ms: u64,
}

/// Net signed balance change per address, zero address excluded.
///
/// Ordered by address; addresses whose transfers cancel out are omitted.
pub fn accumulate_deltas(events: &[TransferEvent]) -> Vec<(Address, BigInt)> {
    let mut acc: BTreeMap<Address, BigInt> = BTreeMap::new();
    for event in events {
        let value = BigInt::from(event.value.clone());
        if !event.from.is_zero() {
            *acc.entry(event.from).or_default() -= &value;
        }
        if !event.to.is_zero() {
            *acc.entry(event.to).or_default() += value;
        }
    }
    acc.into_iter().filter(|(_, d)| !d.is_zero()).collect()
}

impl HolderIndexer {
    /// Scan forward from the stored cursor towards the chain head.
    ///
    /// Windows run strictly in order. A failed log fetch stops the run and
    /// leaves the cursor at the start of that window.
    pub async fn run_incremental_scan(&self) -> Result<ScanStats> {
        let started = Instant::now();
        let token = self.config.token;
        let chunk = self.config.chunk.max(1);

        let mut cursor = match self.store.scan_cursor().await? {
            Some(cursor) => cursor,
            None => {
                tracing::info!("No scan cursor, starting at block {}", self.config.deploy_block);
                self.store.init_cursor(self.config.deploy_block).await?
            }
        };
        let decimals = self.token_decimals().await?;
        let latest = self.chain.block_number().await?;

        let mut stats = ScanStats {
            latest_block: latest,
            cursor,
            ..Default::default()
        };
        let mut touched: HashSet<Address> = HashSet::new();

        while cursor <= latest && stats.blocks_scanned < self.config.max_blocks_per_run {
            let to = cursor.saturating_add(chunk - 1).min(latest);

            let events = match self.chain.transfer_logs(&token, cursor, to).await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!("Window {}..={} failed, stopping scan: {}", cursor, to, e);
                    stats.aborted_at = Some(cursor);
                    break;
                }
            };

            let deltas = accumulate_deltas(&events);
            self.store
                .apply_window(&deltas, to + 1, decimals, self.clock.now())
                .await?;
            tracing::debug!(
                "Window {}..={}: {} transfers, {} balances",
                cursor,
                to,
                events.len(),
                deltas.len()
            );

            touched.extend(deltas.iter().map(|(address, _)| *address));
            stats.blocks_scanned += to - cursor + 1;
            stats.windows += 1;
            cursor = to + 1;
        }

        stats.cursor = cursor;
        stats.addresses_touched = touched.len() as u64;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Scan: {} blocks in {} windows, {} addresses, cursor {} / head {}",
            stats.blocks_scanned,
            stats.windows,
            stats.addresses_touched,
            stats.cursor,
            stats.latest_block
        );
        Ok(stats)
    }
}
