//! Node configuration types
//!
//! Loaded from an optional TOML file layered with `GCAB__`-prefixed
//! environment variables, e.g. `GCAB__INDEXER__CHUNK=2000`.

use anyhow::{bail, Context};
use gcab_core::Address;
use gcab_economics::EconomicsParams;
use gcab_indexer::IndexerConfig;
use gcab_storage::StoreOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "gcab.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GCAB";

/// Storage path that selects an in-memory database
/// Longest trailing activity window accepted for the mint
pub const MAX_ACTIVE_WINDOW_DAYS: i64 = 3650;

pub const IN_MEMORY_PATH: &str = ":memory:";

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node operation settings
    #[serde(default)]
    pub node: NodeSettings,

    /// JSON-RPC endpoint
    #[serde(default)]
    pub chain: ChainConfig,

    /// Indexed token
    #[serde(default)]
    pub token: TokenConfig,

    /// Holder indexer
    #[serde(default)]
    pub indexer: IndexerSettings,

    /// Daily mint
    #[serde(default)]
    pub mint: MintConfig,

    /// HTTP API
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Basic node settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node name
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Data directory; relative storage paths resolve against it
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_node_name() -> String {
    "gcab-node".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            data_dir: default_data_dir(),
        }
    }
}

/// Chain endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}

fn default_chain_id() -> u64 {
    8453 // Base mainnet
}

fn default_request_timeout() -> u64 {
    20
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Token contract
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_address")]
    pub address: String,

    /// First block scanned on a fresh database
    #[serde(default = "default_deploy_block")]
    pub deploy_block: u64,
}

fn default_token_address() -> String {
    "0x6d0B8eB75E9d6735cc301c3a6E82adeE43590B07".to_string()
}

fn default_deploy_block() -> u64 {
    38_866_093
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            address: default_token_address(),
            deploy_block: default_deploy_block(),
        }
    }
}

/// Holder indexer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Run the periodic refresh loop
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between refreshes
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u64,

    /// Blocks per log window
    #[serde(default = "default_chunk")]
    pub chunk: u64,

    /// Safety cap on blocks scanned per run
    #[serde(default = "default_max_blocks_per_run")]
    pub max_blocks_per_run: u64,

    /// Holders re-classified per refresh
    #[serde(default = "default_classify_limit")]
    pub classify_limit: u32,

    /// Concurrent code lookups
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,

    #[serde(default)]
    pub explorer_api_key: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Pause between explorer pages in milliseconds
    #[serde(default = "default_page_pause_ms")]
    pub page_pause_ms: u64,

    /// Seed balances from the explorer when the node starts on an empty cache
    #[serde(default)]
    pub bootstrap_on_start: bool,
}

fn default_true() -> bool {
    true
}

fn default_refresh_minutes() -> u64 {
    60
}

fn default_chunk() -> u64 {
    5_000
}

fn default_max_blocks_per_run() -> u64 {
    200_000
}

fn default_classify_limit() -> u32 {
    200
}

fn default_fan_out() -> usize {
    8
}

fn default_explorer_url() -> String {
    "https://api.basescan.org/api".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    5
}

fn default_page_pause_ms() -> u64 {
    250
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_minutes: default_refresh_minutes(),
            chunk: default_chunk(),
            max_blocks_per_run: default_max_blocks_per_run(),
            classify_limit: default_classify_limit(),
            fan_out: default_fan_out(),
            explorer_url: default_explorer_url(),
            explorer_api_key: None,
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            page_pause_ms: default_page_pause_ms(),
            bootstrap_on_start: false,
        }
    }
}

impl IndexerSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_minutes.saturating_mul(60))
    }
}

/// Daily mint settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MintConfig {
    /// Run the scheduler
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// UTC hour of the daily run
    #[serde(default)]
    pub hour: u32,

    /// UTC minute of the daily run
    #[serde(default = "default_mint_minute")]
    pub minute: u32,

    /// Attempt a mint immediately on start
    #[serde(default = "default_true")]
    pub run_on_boot: bool,

    #[serde(default)]
    pub economics: EconomicsParams,
}

fn default_mint_minute() -> u32 {
    2
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 0,
            minute: default_mint_minute(),
            run_on_boot: true,
            economics: EconomicsParams::default(),
        }
    }
}

/// HTTP API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_address")]
    pub address: String,

    /// Allow any origin
    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_api_address() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_api_address(),
            cors: true,
        }
    }
}

/// Storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    "gcab.sqlite".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            max_connections: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose `/metrics` on the API
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl NodeConfig {
    /// Load from `path` (or `gcab.toml` if present) plus `GCAB__*` overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`NodeConfig::load`] with an explicit environment map instead
    /// of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let loaded: NodeConfig = config::Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the node cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.token_address()?;
        self.api_address()?;

        if self.indexer.chunk == 0 {
            bail!("indexer.chunk must be positive");
        }
        if self.indexer.fan_out == 0 {
            bail!("indexer.fan_out must be positive");
        }
        if self.indexer.page_size == 0 {
            bail!("indexer.page_size must be positive");
        }
        if self.indexer.refresh_minutes == 0 {
            bail!("indexer.refresh_minutes must be positive");
        }
        if self.mint.hour > 23 || self.mint.minute > 59 {
            bail!(
                "mint time {:02}:{:02} is not a valid UTC time of day",
                self.mint.hour,
                self.mint.minute
            );
        }

        let economics = &self.mint.economics;
        if economics.vault_cut_bps > 10_000 || economics.soft_cap_bps > 10_000 {
            bail!("basis point values must not exceed 10000");
        }
        if economics.daily_emission > i64::MAX as u64 {
            bail!("mint.economics.daily_emission is too large");
        }
        if !(1..=MAX_ACTIVE_WINDOW_DAYS).contains(&economics.active_window_days) {
            bail!(
                "mint.economics.active_window_days must be between 1 and {}",
                MAX_ACTIVE_WINDOW_DAYS
            );
        }
        if !economics.weight_k.is_finite() || economics.weight_k < 0.0 {
            bail!("mint.economics.weight_k must be a non-negative number");
        }

        match self.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => {}
            other => bail!("unknown logging.format {:?}", other),
        }
        Ok(())
    }

    pub fn token_address(&self) -> anyhow::Result<Address> {
        self.token
            .address
            .parse()
            .with_context(|| format!("invalid token.address {:?}", self.token.address))
    }

    pub fn api_address(&self) -> anyhow::Result<SocketAddr> {
        self.api
            .address
            .parse()
            .with_context(|| format!("invalid api.address {:?}", self.api.address))
    }

    /// Database location; relative paths resolve against `node.data_dir`
    pub fn database_path(&self) -> PathBuf {
        let path = Path::new(&self.storage.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.node.data_dir).join(path)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.request_timeout_secs.max(1))
    }

    pub fn indexer_config(&self) -> anyhow::Result<IndexerConfig> {
        Ok(IndexerConfig {
            token: self.token_address()?,
            deploy_block: self.token.deploy_block,
            chunk: self.indexer.chunk,
            max_blocks_per_run: self.indexer.max_blocks_per_run,
            fan_out: self.indexer.fan_out,
            page_size: self.indexer.page_size,
            max_pages: self.indexer.max_pages,
            page_pause: Duration::from_millis(self.indexer.page_pause_ms),
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}
