//! HTTP API
//!
//! | Method | Path | |
//! |--------|------|-|
//! | GET  | `/health` | liveness |
//! | GET  | `/status` | cursor, last minted day, scheduler |
//! | GET  | `/holders?min=&limit=` | ranked non-contract holders |
//! | GET  | `/players/:address/energy` | energy balance |
//! | GET  | `/players/:address/ledger?limit=` | ledger entries, newest first |
//! | POST | `/players/:address/activity` | mark a player active now |
//! | POST | `/admin/index-holders` | run a scan |
//! | POST | `/admin/classify-contracts?limit=` | run classification |
//! | POST | `/admin/bootstrap-holders` | seed from the explorer |
//! | POST | `/admin/mint` | run today's mint |
//! | GET  | `/metrics` | Prometheus text |
//!
//! There is no authentication. The admin and activity routes mutate state,
//! so bind `api.address` to loopback or a private interface only.

use crate::indexer_loop::IndexerLoop;
use crate::metrics::NodeMetrics;
use crate::mint::{MintReport, MintService};
use crate::scheduler::SchedulerHandle;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gcab_core::{Address, Clock};
use gcab_storage::Store;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub const DEFAULT_HOLDER_LIMIT: u32 = 200;
pub const MAX_HOLDER_LIMIT: u32 = 500;
pub const DEFAULT_LEDGER_LIMIT: u32 = 50;
pub const MAX_LEDGER_LIMIT: u32 = 500;

/// Shared state for handlers
pub struct AppState {
    pub store: Store,
    pub indexer: Arc<IndexerLoop>,
    pub mint: Arc<MintService>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Option<SchedulerHandle>,
    pub metrics: Option<NodeMetrics>,
}

/// Handler failure
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => {
                tracing::error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid address: {}", raw)))
}

pub fn router(state: Arc<AppState>, cors: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/holders", get(holders))
        .route("/players/:address/energy", get(player_energy))
        .route("/players/:address/ledger", get(player_ledger))
        .route("/players/:address/activity", post(player_activity))
        .route("/admin/index-holders", post(index_holders))
        .route("/admin/classify-contracts", post(classify_contracts))
        .route("/admin/bootstrap-holders", post(bootstrap_holders))
        .route("/admin/mint", post(mint_now))
        .route("/metrics", get(metrics));

    let router = if cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };
    router.with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn status(State(state): State<Arc<AppState>>) -> ApiResult {
    let cursor = state.store.scan_cursor().await.map_err(ApiError::internal)?;
    let last_mint = state.store.last_mint().await.map_err(ApiError::internal)?;
    let holders = state.store.holder_count().await.map_err(ApiError::internal)?;
    let players = state.store.player_count().await.map_err(ApiError::internal)?;
    let scheduler = state.scheduler.as_ref().map(|h| h.status());

    Ok(Json(json!({
        "ok": true,
        "token": state.indexer.indexer().config().token.to_checksum(),
        "cursor": cursor,
        "holders": holders,
        "players": players,
        "last_minted_day": last_mint.as_ref().map(|r| r.day),
        "last_minted_at": last_mint.as_ref().map(|r| r.minted_at),
        "scheduler": scheduler,
        "now": state.clock.now(),
    })))
}

#[derive(Debug, Deserialize)]
struct HoldersQuery {
    min: Option<f64>,
    limit: Option<u32>,
}

async fn holders(State(state): State<Arc<AppState>>, Query(query): Query<HoldersQuery>) -> ApiResult {
    let min = query.min.filter(|m| m.is_finite()).unwrap_or(0.0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HOLDER_LIMIT)
        .clamp(1, MAX_HOLDER_LIMIT);
    let holders = state
        .store
        .ranked_holders(min, limit)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(json!({
        "ok": true,
        "count": holders.len(),
        "holders": holders,
    })))
}

async fn player_energy(State(state): State<Arc<AppState>>, Path(address): Path<String>) -> ApiResult {
    let address = parse_address(&address)?;
    let balance = state
        .store
        .energy_balance(&address)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({
        "address": address,
        "energy_balance": balance,
    })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

async fn player_ledger(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    let address = parse_address(&address)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEDGER_LIMIT)
        .clamp(1, MAX_LEDGER_LIMIT);
    let entries = state
        .store
        .ledger_entries(&address, limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({
        "address": address,
        "entries": entries,
    })))
}

async fn player_activity(State(state): State<Arc<AppState>>, Path(address): Path<String>) -> ApiResult {
    let address = parse_address(&address)?;
    let now = state.clock.now();
    state
        .store
        .touch_player(&address, now)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({
        "ok": true,
        "address": address,
        "last_seen_utc": now,
    })))
}

async fn index_holders(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state.indexer.scan_now().await.map_err(ApiError::internal)?;
    Ok(Json(json!({ "ok": true, "stats": stats })))
}

async fn classify_contracts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(state.indexer.classify_limit()).max(1);
    let stats = state
        .indexer
        .classify_now(limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "ok": true, "stats": stats })))
}

async fn bootstrap_holders(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state
        .indexer
        .bootstrap_now()
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "ok": true, "stats": stats })))
}

async fn mint_now(State(state): State<Arc<AppState>>) -> ApiResult {
    let outcome = state.mint.run_mint_now().await.map_err(ApiError::internal)?;
    let report = MintReport::from(outcome);
    Ok(Json(serde_json::to_value(report).map_err(ApiError::internal)?))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let Some(metrics) = &state.metrics else {
        return Ok((StatusCode::NOT_FOUND, "metrics disabled").into_response());
    };
    let body = metrics.encode().map_err(ApiError::internal)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
