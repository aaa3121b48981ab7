//! # GCAb Node
//!
//! Long-running service around the holder indexer:
//!
//! - [`IndexerLoop`] refreshes the holder cache on a fixed period
//! - [`MintService`] runs the daily energy allocation, at most once per UTC day
//! - [`MintScheduler`] fires the mint at a fixed UTC time of day
//! - [`api`] exposes reads, the activity hook and admin triggers over HTTP
//! - [`NodeMetrics`] collects Prometheus counters for all of the above

pub mod api;
pub mod config;
pub mod indexer_loop;
pub mod metrics;
pub mod mint;
pub mod node;
pub mod scheduler;

pub use config::NodeConfig;
pub use indexer_loop::IndexerLoop;
pub use metrics::NodeMetrics;
pub use mint::{MintError, MintOutcome, MintReport, MintService};
pub use node::{GcabNode, NodeState, Services};
pub use scheduler::{delay_until_next, DailyJob, MintScheduler, ScheduleConfig, SchedulerHandle, SchedulerState};
