//! API route handlers.
//!
//! All endpoints return JSON. Each mutating handler runs inside one unit of
//! work: the response reflects a committed state, and the hub notifications
//! for that request go out only after the commit.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::betting::BettingEngine;
use crate::jobs;
use crate::ledger::{Ledger, TransactionQuery};
use crate::types::{
    BettingGame, BettingStatus, Error, LeaderboardEntry, NewBettingOption, Result, Transaction,
    UserProfile, Wager,
};

use super::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OpenGameRequest {
    pub objective: String,
    #[serde(default)]
    pub maximum_bet: Option<i64>,
    pub options: Vec<NewBettingOption>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: BettingStatus,
    #[serde(default)]
    pub winning_option: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub user_twitch_id: String,
    pub option_id: i64,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct GiveRequest {
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GiveResponse {
    /// False when the credit was suppressed as a duplicate `unique_id`.
    pub applied: bool,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct StreamStateRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubscriberRequest {
    pub subscribed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RedemptionRequest {
    pub event_id: String,
    pub user_twitch_id: String,
    pub login_name: String,
    pub display_name: String,
    pub amount: i64,
}

// ---------------------------------------------------------------------------
// Betting
// ---------------------------------------------------------------------------

/// POST /betting
pub async fn open_game(
    State(state): State<AppState>,
    Json(request): Json<OpenGameRequest>,
) -> Result<(StatusCode, Json<BettingGame>)> {
    let mut uow = state.begin().await?;
    let game = BettingEngine::open_game(
        &mut uow,
        &request.objective,
        request.maximum_bet,
        &request.options,
    )
    .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// GET /betting — the most recently opened round.
pub async fn latest_game(State(state): State<AppState>) -> Result<Json<BettingGame>> {
    let mut uow = state.begin().await?;
    let game = BettingEngine::latest_game(&mut uow)
        .await?
        .ok_or_else(|| Error::NotFound("betting round".to_string()))?;
    Ok(Json(game))
}

/// GET /betting/:id
pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BettingGame>> {
    let mut uow = state.begin().await?;
    let game = BettingEngine::game(&mut uow, id).await?;
    Ok(Json(game))
}

/// PATCH /betting/:id — drive the round's state machine.
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<BettingGame>> {
    let mut uow = state.begin().await?;
    let game =
        BettingEngine::transition(&mut uow, id, request.status, request.winning_option).await?;
    uow.commit().await?;
    Ok(Json(game))
}

/// POST /betting/:id/bet
pub async fn place_bet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<(StatusCode, Json<BettingGame>)> {
    let mut uow = state.begin().await?;
    let game = BettingEngine::place_bet(
        &mut uow,
        id,
        &request.user_twitch_id,
        request.option_id,
        request.amount,
    )
    .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// GET /betting/:id/bets
pub async fn list_wagers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Wager>>> {
    let mut uow = state.begin().await?;
    // 404 for a round that does not exist, empty list for one with no bets.
    BettingEngine::game(&mut uow, id).await?;
    let wagers = BettingEngine::wagers(&mut uow, id).await?;
    Ok(Json(wagers))
}

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// POST /give/:twitch_id — moderator grant (or deduction, with a negative
/// amount).
pub async fn give(
    State(state): State<AppState>,
    Path(twitch_id): Path<String>,
    Json(request): Json<GiveRequest>,
) -> Result<Json<GiveResponse>> {
    if request.amount == 0 {
        return Err(Error::validation("amount", "amount must be non-zero"));
    }
    let mut uow = state.begin().await?;
    let reason = request.reason.as_deref().unwrap_or("Given");
    let receipt = Ledger::credit(
        &mut uow,
        &twitch_id,
        request.amount,
        reason,
        request.unique_id.as_deref(),
        None,
    )
    .await?;
    let response = match receipt {
        Some(receipt) => GiveResponse {
            applied: true,
            balance: receipt.balance,
        },
        None => GiveResponse {
            applied: false,
            balance: Ledger::balance(&mut uow, &twitch_id).await?,
        },
    };
    uow.commit().await?;
    Ok(Json(response))
}

/// GET /leaderboard
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let mut uow = state.begin().await?;
    let board = Ledger::leaderboard(&mut uow, query.page, query.page_size).await?;
    Ok(Json(board))
}

/// GET /transactions
pub async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>> {
    let mut uow = state.begin().await?;
    let log = Ledger::transactions(&mut uow, &query).await?;
    Ok(Json(log))
}

/// GET /users/:twitch_id
pub async fn get_user(
    State(state): State<AppState>,
    Path(twitch_id): Path<String>,
) -> Result<Json<UserProfile>> {
    let mut uow = state.begin().await?;
    let user = Ledger::user(&mut uow, &twitch_id).await?;
    Ok(Json(user))
}

// ---------------------------------------------------------------------------
// Presence and redemptions
// ---------------------------------------------------------------------------

/// POST /presence/:twitch_id — a viewer was seen; they earn next cycle.
pub async fn mark_present(
    State(state): State<AppState>,
    Path(twitch_id): Path<String>,
) -> StatusCode {
    state.presence.mark_present(&twitch_id).await;
    StatusCode::NO_CONTENT
}

/// PUT /stream
pub async fn set_stream_state(
    State(state): State<AppState>,
    Json(request): Json<StreamStateRequest>,
) -> StatusCode {
    state.presence.set_online(request.online).await;
    StatusCode::NO_CONTENT
}

/// PUT /subscribers/:twitch_id
pub async fn set_subscriber(
    State(state): State<AppState>,
    Path(twitch_id): Path<String>,
    Json(request): Json<SubscriberRequest>,
) -> StatusCode {
    state
        .presence
        .set_subscriber(&twitch_id, request.subscribed)
        .await;
    StatusCode::NO_CONTENT
}

/// POST /redemptions — fulfill a channel-point redemption event.
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedemptionRequest>,
) -> Result<Json<GiveResponse>> {
    let receipt = jobs::fulfill_redemption(
        &state.db,
        &state.hub,
        &request.event_id,
        &request.user_twitch_id,
        &request.login_name,
        &request.display_name,
        request.amount,
    )
    .await?;
    let response = match receipt {
        Some(receipt) => GiveResponse {
            applied: true,
            balance: receipt.balance,
        },
        None => {
            let mut uow = state.begin().await?;
            GiveResponse {
                applied: false,
                balance: Ledger::balance(&mut uow, &request.user_twitch_id).await?,
            }
        }
    };
    Ok(Json(response))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<StatusCode> {
    state.db.health_check().await?;
    Ok(StatusCode::OK)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
