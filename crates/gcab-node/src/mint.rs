//! Daily energy mint
//!
//! One attempt per UTC day. The attempt reads active players and their cached
//! raw balances, weighs the eligible ones, allocates the holder pool and
//! commits the credits together with the day record.

use crate::metrics::NodeMetrics;
use gcab_core::units::{to_raw, whole_units};
use gcab_core::{Address, Clock, DayKey, REASON_DAILY_MINT};
use gcab_economics::{AllocationError, AllocationItem, EconomicsParams};
use gcab_storage::{MintCommit, StorageError, Store};
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Decimals assumed when the indexer has not recorded them yet
pub const FALLBACK_DECIMALS: u8 = 18;

#[derive(Error, Debug)]
pub enum MintError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Mint invariant violated: {0}")]
    Invariant(String),
}

/// What a mint attempt did
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MintOutcome {
    /// The day already has a record; nothing written
    AlreadyMinted { day: DayKey },
    /// Day recorded with no credits
    NoEligible {
        day: DayKey,
        active_players: u64,
        note: String,
    },
    /// Day recorded and `minted` energy credited across `holders`
    Allocated {
        day: DayKey,
        minted: u64,
        holders: u64,
        unallocated: u64,
        pool: u64,
        cap_rounds: u32,
    },
}

impl MintOutcome {
    pub fn day(&self) -> DayKey {
        match self {
            Self::AlreadyMinted { day } | Self::NoEligible { day, .. } | Self::Allocated { day, .. } => *day,
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyMinted { .. } => "already_minted",
            Self::NoEligible { .. } => "no_eligible",
            Self::Allocated { .. } => "allocated",
        }
    }

    /// False only when the attempt was skipped
    pub fn ran(&self) -> bool {
        !matches!(self, Self::AlreadyMinted { .. })
    }
}

/// Response body for "run mint now"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub outcome: MintOutcome,
}

impl From<MintOutcome> for MintReport {
    fn from(outcome: MintOutcome) -> Self {
        let reason = match &outcome {
            MintOutcome::AlreadyMinted { .. } => Some("Already minted".to_string()),
            _ => None,
        };
        Self {
            ok: outcome.ran(),
            reason,
            outcome,
        }
    }
}

pub struct MintService {
    store: Store,
    params: EconomicsParams,
    clock: Arc<dyn Clock>,
    metrics: Option<NodeMetrics>,
}

impl MintService {
    pub fn new(store: Store, params: EconomicsParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            params,
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: NodeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn params(&self) -> &EconomicsParams {
        &self.params
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Mint for the current UTC day
    pub async fn run_mint_now(&self) -> Result<MintOutcome, MintError> {
        self.run_mint_at(self.clock.now()).await
    }

    /// Mint for the UTC day containing `now`
    pub async fn run_mint_at(&self, now: chrono::DateTime<chrono::Utc>) -> Result<MintOutcome, MintError> {
        let result = self.mint_day(now).await;
        match &result {
            Ok(outcome) => {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_mint(outcome);
                }
            }
            Err(e) => {
                tracing::error!("Mint for {} failed: {}", DayKey::from_datetime(now), e);
                if let Some(metrics) = &self.metrics {
                    metrics.observe_mint_failure();
                }
            }
        }
        result
    }

    async fn mint_day(&self, now: chrono::DateTime<chrono::Utc>) -> Result<MintOutcome, MintError> {
        let day = DayKey::from_datetime(now);
        if self.store.mint_record(day).await?.is_some() {
            tracing::info!("Mint for {} skipped, already minted", day);
            return Ok(MintOutcome::AlreadyMinted { day });
        }

        let since = chrono::Duration::try_days(self.params.active_window_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                MintError::Invariant(format!(
                    "active window of {} days is out of range",
                    self.params.active_window_days
                ))
            })?;
        let players = self.store.active_players(since).await?;
        let items = self.eligible(&players).await?;

        if items.is_empty() {
            let note = if players.is_empty() {
                "No active players"
            } else {
                "No eligible holders"
            };
            return match self.store.commit_mint(day, &[], REASON_DAILY_MINT, now).await? {
                MintCommit::AlreadyMinted => Ok(MintOutcome::AlreadyMinted { day }),
                MintCommit::Committed { .. } => {
                    tracing::info!("Mint for {}: {} ({} active)", day, note, players.len());
                    Ok(MintOutcome::NoEligible {
                        day,
                        active_players: players.len() as u64,
                        note: note.to_string(),
                    })
                }
            };
        }

        let outcome = self.params.engine().run(&items)?;
        let allocated = outcome.allocated();
        let credits = outcome
            .allocations
            .iter()
            .map(|a| {
                i64::try_from(a.amount)
                    .map(|amount| (a.address, amount))
                    .map_err(|_| MintError::Invariant(format!("credit {} does not fit the ledger", a.amount)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match self.store.commit_mint(day, &credits, REASON_DAILY_MINT, now).await? {
            MintCommit::AlreadyMinted => Ok(MintOutcome::AlreadyMinted { day }),
            MintCommit::Committed { entries, total } => {
                check_committed(day, total, allocated)?;
                tracing::info!(
                    "Mint for {}: {} energy to {} holders, {} unallocated, {} cap rounds",
                    day,
                    allocated,
                    entries,
                    outcome.unallocated,
                    outcome.cap_rounds
                );
                Ok(MintOutcome::Allocated {
                    day,
                    minted: allocated,
                    holders: entries as u64,
                    unallocated: outcome.unallocated,
                    pool: outcome.pool,
                    cap_rounds: outcome.cap_rounds,
                })
            }
        }
    }

    /// Weighted items for players at or above the balance floor
    async fn eligible(&self, players: &[Address]) -> Result<Vec<AllocationItem>, MintError> {
        if players.is_empty() {
            return Ok(Vec::new());
        }

        let decimals = match self.store.token_decimals().await? {
            Some(decimals) => decimals,
            None => {
                tracing::warn!("Token decimals unknown, assuming {}", FALLBACK_DECIMALS);
                FALLBACK_DECIMALS
            }
        };
        let balances = self.store.holder_balances(players).await?;
        let floor = to_raw(self.params.min_balance_tokens, decimals);
        let model = self.params.weight_model();

        let items = players
            .iter()
            .filter_map(|address| {
                let raw = balances.get(address)?;
                if raw.is_zero() || *raw < floor {
                    return None;
                }
                let whole = whole_units(raw, decimals).to_f64().unwrap_or(f64::MAX);
                let weight = model.weight_units(whole);
                (weight > 0).then(|| AllocationItem::new(*address, weight))
            })
            .collect::<Vec<_>>();

        tracing::debug!("{} of {} active players eligible", items.len(), players.len());
        Ok(items)
    }
}

/// The ledger total written must equal what the engine allocated. The rows
/// are already committed when this fails, so it only surfaces the mismatch.
fn check_committed(day: DayKey, total: i64, allocated: u64) -> Result<(), MintError> {
    if u64::try_from(total).ok() == Some(allocated) {
        return Ok(());
    }
    Err(MintError::Invariant(format!(
        "mint for {} committed {} but allocated {}",
        day, total, allocated
    )))
}
