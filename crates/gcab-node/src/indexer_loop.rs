//! Periodic holder refresh
//!
//! Every `interval`: incremental scan, then contract classification. Runs are
//! serialized so an API-triggered scan never overlaps the loop's own.

use crate::metrics::NodeMetrics;
use gcab_indexer::{BootstrapStats, ClassifyStats, HolderIndexer, Result, ScanStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub struct IndexerLoop {
    indexer: Arc<HolderIndexer>,
    interval: Duration,
    classify_limit: u32,
    metrics: Option<NodeMetrics>,
    run_lock: Mutex<()>,
}

impl IndexerLoop {
    pub fn new(indexer: Arc<HolderIndexer>, interval: Duration, classify_limit: u32) -> Self {
        Self {
            indexer,
            interval,
            classify_limit,
            metrics: None,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: NodeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn indexer(&self) -> &Arc<HolderIndexer> {
        &self.indexer
    }

    pub fn classify_limit(&self) -> u32 {
        self.classify_limit
    }

    pub async fn scan_now(&self) -> Result<ScanStats> {
        let _guard = self.run_lock.lock().await;
        let stats = self.indexer.run_incremental_scan().await?;
        if let Some(metrics) = &self.metrics {
            metrics.observe_scan(&stats);
        }
        Ok(stats)
    }

    pub async fn classify_now(&self, limit: u32) -> Result<ClassifyStats> {
        let _guard = self.run_lock.lock().await;
        let stats = self.indexer.classify_contracts(limit).await?;
        if let Some(metrics) = &self.metrics {
            metrics.observe_classify(&stats);
        }
        Ok(stats)
    }

    pub async fn bootstrap_now(&self) -> Result<BootstrapStats> {
        let _guard = self.run_lock.lock().await;
        self.indexer.bootstrap_from_explorer().await
    }

    /// Scan then classify; a failed scan does not skip classification
    pub async fn refresh(&self) {
        if let Err(e) = self.scan_now().await {
            tracing::warn!("Holder scan failed: {}", e);
        }
        if let Err(e) = self.classify_now(self.classify_limit).await {
            tracing::warn!("Contract classification failed: {}", e);
        }
    }

    /// Refresh immediately, then every `interval` until `shutdown_rx` fires
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!("Holder refresh every {}s", self.interval.as_secs());
        loop {
            self.refresh().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Holder refresh loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
