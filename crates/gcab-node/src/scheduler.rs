//! Daily mint scheduler
//!
//! Arms a single-shot timer for the next occurrence of a fixed UTC time of
//! day, runs the attempt when it fires, then re-arms for the following day.
//! An optional attempt runs immediately on start so a node that was down at
//! the scheduled time still mints that day. Run at most one scheduler per
//! database.

use crate::mint::{MintError, MintOutcome, MintService};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use gcab_core::Clock;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Work fired once per day
#[async_trait]
pub trait DailyJob: Send + Sync {
    async fn run_at(&self, now: DateTime<Utc>) -> Result<MintOutcome, MintError>;
}

#[async_trait]
impl DailyJob for MintService {
    async fn run_at(&self, now: DateTime<Utc>) -> Result<MintOutcome, MintError> {
        self.run_mint_at(now).await
    }
}

/// Time until the next `hour:minute` UTC strictly after `now`.
///
/// Always in `(0, 24h]`; exactly at the target wraps to the next day.
pub fn delay_until_next(now: DateTime<Utc>, hour: u32, minute: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(at).and_utc();
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(24 * 3600))
}

#[derive(Clone, Copy, Debug)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
    pub run_on_boot: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: 0,
            minute: 2,
            run_on_boot: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Not started yet
    Idle,
    /// Timer armed
    Waiting,
    /// Attempt in progress
    Running,
    Stopped,
}

/// Snapshot exposed to the API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub next_fire: Option<DateTime<Utc>>,
    pub attempts: u64,
    pub last_outcome: Option<MintOutcome>,
    pub last_error: Option<String>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            next_fire: None,
            attempts: 0,
            last_outcome: None,
            last_error: None,
        }
    }
}

/// Read-only view of a running scheduler
#[derive(Clone, Default)]
pub struct SchedulerHandle {
    status: Arc<RwLock<SchedulerStatus>>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.status.read().state
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.status.read().next_fire
    }
}

pub struct MintScheduler {
    job: Arc<dyn DailyJob>,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
    handle: SchedulerHandle,
}

impl MintScheduler {
    pub fn new(job: Arc<dyn DailyJob>, clock: Arc<dyn Clock>, config: ScheduleConfig) -> Self {
        Self {
            job,
            clock,
            config,
            handle: SchedulerHandle::default(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Run until `shutdown_rx` fires. Attempt failures are logged and the
    /// timer is re-armed.
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            "Mint scheduler started, daily at {:02}:{:02} UTC",
            self.config.hour,
            self.config.minute
        );

        if self.config.run_on_boot {
            self.attempt().await;
        }

        loop {
            let now = self.clock.now();
            let delay = delay_until_next(now, self.config.hour, self.config.minute);
            let next_fire = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| now + d);
            {
                let mut status = self.handle.status.write();
                status.state = SchedulerState::Waiting;
                status.next_fire = next_fire;
            }
            tracing::debug!("Next mint attempt in {}s", delay.as_secs());

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Mint scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    self.attempt().await;
                }
            }
        }

        let mut status = self.handle.status.write();
        status.state = SchedulerState::Stopped;
        status.next_fire = None;
    }

    async fn attempt(&self) {
        self.handle.status.write().state = SchedulerState::Running;
        let result = self.job.run_at(self.clock.now()).await;

        let mut status = self.handle.status.write();
        status.attempts += 1;
        match result {
            Ok(outcome) => {
                status.last_outcome = Some(outcome);
                status.last_error = None;
            }
            Err(e) => {
                tracing::error!("Scheduled mint failed: {}", e);
                status.last_error = Some(e.to_string());
            }
        }
    }
}
