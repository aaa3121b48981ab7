//! Prometheus metrics

use crate::mint::MintOutcome;
use gcab_indexer::{ClassifyStats, ScanStats};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Node metrics, served at `/metrics`
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    blocks_scanned: IntCounter,
    addresses_touched: IntCounter,
    failed_windows: IntCounter,
    contracts_marked: IntCounter,
    mint_attempts: IntCounterVec,
    energy_minted: IntCounter,
    scan_cursor: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let blocks_scanned = IntCounter::new("gcab_blocks_scanned_total", "Blocks folded into the holder cache")?;
        let addresses_touched =
            IntCounter::new("gcab_addresses_touched_total", "Holder balances written by scans")?;
        let failed_windows = IntCounter::new("gcab_scan_failed_windows_total", "Scan runs stopped by a failed window")?;
        let contracts_marked = IntCounter::new("gcab_contracts_marked_total", "Holders classified as contracts")?;
        let mint_attempts = IntCounterVec::new(
            Opts::new("gcab_mint_attempts_total", "Daily mint attempts by outcome"),
            &["outcome"],
        )?;
        let energy_minted = IntCounter::new("gcab_energy_minted_total", "Energy credited to players")?;
        let scan_cursor = IntGauge::new("gcab_scan_cursor", "Next block to scan")?;

        registry.register(Box::new(blocks_scanned.clone()))?;
        registry.register(Box::new(addresses_touched.clone()))?;
        registry.register(Box::new(failed_windows.clone()))?;
        registry.register(Box::new(contracts_marked.clone()))?;
        registry.register(Box::new(mint_attempts.clone()))?;
        registry.register(Box::new(energy_minted.clone()))?;
        registry.register(Box::new(scan_cursor.clone()))?;

        Ok(Self {
            registry,
            blocks_scanned,
            addresses_touched,
            failed_windows,
            contracts_marked,
            mint_attempts,
            energy_minted,
            scan_cursor,
        })
    }

    pub fn observe_scan(&self, stats: &ScanStats) {
        self.blocks_scanned.inc_by(stats.blocks_scanned);
        self.addresses_touched.inc_by(stats.addresses_touched);
        if stats.aborted_at.is_some() {
            self.failed_windows.inc();
        }
        self.scan_cursor.set(i64::try_from(stats.cursor).unwrap_or(i64::MAX));
    }

    pub fn observe_classify(&self, stats: &ClassifyStats) {
        self.contracts_marked.inc_by(stats.marked_contracts);
    }

    pub fn observe_mint(&self, outcome: &MintOutcome) {
        self.mint_attempts.with_label_values(&[outcome.label()]).inc();
        if let MintOutcome::Allocated { minted, .. } = outcome {
            self.energy_minted.inc_by(*minted);
        }
    }

    pub fn observe_mint_failure(&self) {
        self.mint_attempts.with_label_values(&["error"]).inc();
    }

    /// Text exposition format
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
