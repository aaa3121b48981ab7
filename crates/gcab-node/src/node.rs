//! GCAb node
//!
//! Wires the store, chain clients, holder refresh loop, mint scheduler,
//! HTTP API and metrics, then runs until Ctrl-C or SIGTERM.

use crate::api::{self, AppState};
use crate::config::NodeConfig;
use crate::indexer_loop::IndexerLoop;
use crate::metrics::NodeMetrics;
use crate::mint::MintService;
use crate::scheduler::{MintScheduler, ScheduleConfig};
use anyhow::Context;
use gcab_bridge::{ChainSource, ExplorerClient, HolderListSource, JsonRpcClient};
use gcab_core::{Clock, SystemClock};
use gcab_indexer::HolderIndexer;
use gcab_storage::Store;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;

/// Node state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Open the configured database, creating its directory if needed
pub async fn open_store(config: &NodeConfig) -> anyhow::Result<Store> {
    if config.storage.is_in_memory() {
        return Ok(Store::open_in_memory().await?);
    }
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {:?}", parent))?;
    }
    Store::open(&path, config.storage.options())
        .await
        .with_context(|| format!("failed to open database {:?}", path))
}

/// Everything the node runs, built from configuration.
/// One-shot CLI commands use it without starting any loop.
#[derive(Clone)]
pub struct Services {
    pub store: Store,
    pub indexer: Arc<IndexerLoop>,
    pub mint: Arc<MintService>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<NodeMetrics>,
}

impl Services {
    pub async fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let store = open_store(config).await?;
        let chain: Arc<dyn ChainSource> =
            Arc::new(JsonRpcClient::new(&config.chain.rpc_url, config.request_timeout())?);
        let explorer: Arc<dyn HolderListSource> = Arc::new(ExplorerClient::new(
            &config.indexer.explorer_url,
            config.indexer.explorer_api_key.clone(),
            config.request_timeout(),
        )?);
        let metrics = if config.metrics.enabled {
            Some(NodeMetrics::new()?)
        } else {
            None
        };
        Self::assemble(config, store, chain, Some(explorer), Arc::new(SystemClock), metrics)
    }

    /// Build from explicit parts
    pub fn assemble(
        config: &NodeConfig,
        store: Store,
        chain: Arc<dyn ChainSource>,
        holder_list: Option<Arc<dyn HolderListSource>>,
        clock: Arc<dyn Clock>,
        metrics: Option<NodeMetrics>,
    ) -> anyhow::Result<Self> {
        let mut indexer = HolderIndexer::new(store.clone(), chain, clock.clone(), config.indexer_config()?);
        if let Some(source) = holder_list {
            indexer = indexer.with_holder_list(source);
        }

        let mut indexer_loop = IndexerLoop::new(
            Arc::new(indexer),
            config.indexer.refresh_interval(),
            config.indexer.classify_limit,
        );
        let mut mint = MintService::new(store.clone(), config.mint.economics.clone(), clock.clone());
        if let Some(metrics) = &metrics {
            indexer_loop = indexer_loop.with_metrics(metrics.clone());
            mint = mint.with_metrics(metrics.clone());
        }

        Ok(Self {
            store,
            indexer: Arc::new(indexer_loop),
            mint: Arc::new(mint),
            clock,
            metrics,
        })
    }
}

pub struct GcabNode {
    config: NodeConfig,
    services: Services,
    state: Arc<RwLock<NodeState>>,
}

impl GcabNode {
    pub async fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let services = Services::from_config(&config).await?;
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: NodeConfig, services: Services) -> Self {
        Self {
            config,
            services,
            state: Arc::new(RwLock::new(NodeState::Starting)),
        }
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Starting {}...", self.config.node.name);
        *self.state.write() = NodeState::Starting;

        if self.config.indexer.bootstrap_on_start && self.services.store.holder_count().await? == 0 {
            match self.services.indexer.bootstrap_now().await {
                Ok(stats) => tracing::info!("Bootstrapped {} holders", stats.stored),
                Err(e) => tracing::warn!("Explorer bootstrap failed: {}", e),
            }
        }

        let mut shutdown_senders = Vec::new();
        let mut loop_handles = Vec::new();

        if self.config.indexer.enabled {
            let (tx, rx) = mpsc::channel(1);
            let indexer = self.services.indexer.clone();
            shutdown_senders.push(tx);
            loop_handles.push(tokio::spawn(async move { indexer.run(rx).await }));
        } else {
            tracing::info!("Holder refresh loop disabled");
        }

        let scheduler_handle = if self.config.mint.enabled {
            let scheduler = MintScheduler::new(
                self.services.mint.clone(),
                self.services.clock.clone(),
                ScheduleConfig {
                    hour: self.config.mint.hour,
                    minute: self.config.mint.minute,
                    run_on_boot: self.config.mint.run_on_boot,
                },
            );
            let handle = scheduler.handle();
            let (tx, rx) = mpsc::channel(1);
            shutdown_senders.push(tx);
            loop_handles.push(tokio::spawn(async move { scheduler.run(rx).await }));
            Some(handle)
        } else {
            tracing::info!("Mint scheduler disabled");
            None
        };

        let api_handle = if self.config.api.enabled {
            let state = Arc::new(AppState {
                store: self.services.store.clone(),
                indexer: self.services.indexer.clone(),
                mint: self.services.mint.clone(),
                clock: self.services.clock.clone(),
                scheduler: scheduler_handle,
                metrics: self.services.metrics.clone(),
            });
            let app = api::router(state, self.config.api.cors);
            let addr = self.config.api_address()?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            tracing::info!("HTTP API listening on http://{}", addr);
            Some(tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("HTTP API error: {}", e);
                }
            }))
        } else {
            None
        };

        *self.state.write() = NodeState::Running;
        self.print_startup_banner();

        wait_for_shutdown().await;

        *self.state.write() = NodeState::Stopping;
        tracing::info!("Shutting down...");

        for tx in shutdown_senders {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = api_handle {
            handle.abort();
        }
        for handle in loop_handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        self.services.store.close().await;

        *self.state.write() = NodeState::Stopped;
        tracing::info!("Node stopped");
        Ok(())
    }

    fn print_startup_banner(&self) {
        tracing::info!("GCAb node {} is running", self.config.node.name);
        tracing::info!("Token: {} (chain {})", self.config.token.address, self.config.chain.chain_id);
        tracing::info!("RPC: {}", self.config.chain.rpc_url);
        if self.config.indexer.enabled {
            tracing::info!("Holder refresh: every {} min", self.config.indexer.refresh_minutes);
        }
        if self.config.mint.enabled {
            tracing::info!(
                "Daily mint: {:02}:{:02} UTC",
                self.config.mint.hour,
                self.config.mint.minute
            );
        }
        if self.config.api.enabled && self.config.metrics.enabled {
            tracing::info!("Metrics: http://{}/metrics", self.config.api.address);
        }
        tracing::info!("Press Ctrl+C to stop the node");
    }
}

/// Wait for Ctrl-C or SIGTERM
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_node_creation() {
        let dir = TempDir::new().unwrap();
        let mut config = NodeConfig::default();
        config.node.data_dir = dir.path().join("nested").to_string_lossy().into_owned();

        let node = GcabNode::new(config).await.unwrap();
        assert_eq!(node.state(), NodeState::Starting);
        assert!(dir.path().join("nested").join("gcab.sqlite").exists());
        assert_eq!(node.services().store.scan_cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let mut config = NodeConfig::default();
        config.storage.path = ":memory:".into();
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.holder_count().await.unwrap(), 0);
    }
}
