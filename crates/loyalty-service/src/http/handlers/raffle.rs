//! 抽奖 API 处理器
//!
//! 抽奖券购买支持幂等键，相同键的重试不会重复扣费

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::http::dto::{ApiResponse, CreateRaffleRequest, PurchaseEntriesRequest, UserEntriesQuery};
use crate::http::error::ApiResult;
use crate::http::state::AppState;
use crate::models::{EntrantSummary, Raffle};
use crate::service::dto::{DrawResult, PurchaseResult, UserEntries};

/// POST /api/raffles
pub async fn create_raffle(
    State(state): State<AppState>,
    Json(req): Json<CreateRaffleRequest>,
) -> ApiResult<Json<ApiResponse<Raffle>>> {
    req.validate()?;
    let raffle = state.api.create_raffle(req.into()).await?;
    info!(raffle_id = %raffle.id, prize = %raffle.prize_name, "抽奖已创建");
    Ok(Json(ApiResponse::success(raffle)))
}

/// GET /api/raffles/{raffleId}
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Raffle>>> {
    let raffle = state.api.get_raffle(raffle_id).await?;
    Ok(Json(ApiResponse::success(raffle)))
}

/// 购买抽奖券
///
/// POST /api/raffles/{raffleId}/entries
pub async fn purchase_entries(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
    Json(req): Json<PurchaseEntriesRequest>,
) -> ApiResult<Json<ApiResponse<PurchaseResult>>> {
    req.validate()?;
    let result = state
        .api
        .purchase_raffle_entries(
            &req.user_id,
            raffle_id,
            req.entries_count,
            req.idempotency_key.as_deref(),
        )
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/raffles/{raffleId}/entries?userId=
pub async fn get_user_entries(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
    Query(query): Query<UserEntriesQuery>,
) -> ApiResult<Json<ApiResponse<UserEntries>>> {
    let entries = state.api.get_user_entries(raffle_id, &query.user_id).await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// GET /api/raffles/{raffleId}/entrants
pub async fn get_entrants(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<EntrantSummary>>>> {
    let entrants = state.api.get_raffle_entrants(raffle_id).await?;
    Ok(Json(ApiResponse::success(entrants)))
}

/// 开奖
///
/// POST /api/raffles/{raffleId}/draw
pub async fn draw_winner(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<DrawResult>>> {
    let result = state.api.draw_raffle_winner(raffle_id).await?;
    Ok(Json(ApiResponse::success(result)))
}

/// POST /api/raffles/{raffleId}/cancel
pub async fn cancel_raffle(
    State(state): State<AppState>,
    Path(raffle_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.api.cancel_raffle(raffle_id).await?;
    Ok(Json(ApiResponse::empty()))
}
