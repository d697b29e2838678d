//! 签到与场馆 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use validator::Validate;

use crate::http::dto::{ApiResponse, CheckInRequest, LimitQuery, UpsertVenueRequest};
use crate::http::error::ApiResult;
use crate::http::state::AppState;
use crate::models::CheckIn;
use crate::service::dto::CheckInResult;
use crate::venue::Venue;

/// POST /api/check-ins
pub async fn check_in(
    State(state): State<AppState>,
    Json(req): Json<CheckInRequest>,
) -> ApiResult<Json<ApiResponse<CheckInResult>>> {
    req.validate()?;
    let result = state
        .api
        .check_in(&req.user_id, &req.venue_id, req.method)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// 用户最近的签到记录
///
/// GET /api/accounts/{userId}/check-ins?limit=
pub async fn list_check_ins(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<CheckIn>>>> {
    let check_ins = state
        .api
        .list_check_ins(&user_id, query.limit.unwrap_or(20))
        .await?;
    Ok(Json(ApiResponse::success(check_ins)))
}

/// 新增或更新场馆
///
/// PUT /api/venues/{venueId}
pub async fn upsert_venue(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
    Json(req): Json<UpsertVenueRequest>,
) -> ApiResult<Json<ApiResponse<Venue>>> {
    req.validate()?;
    let mut venue = Venue::new(venue_id, req.name.trim(), req.points_reward);
    venue.enabled = req.enabled.unwrap_or(true);
    state.api.upsert_venue(&venue).await?;
    Ok(Json(ApiResponse::success(venue)))
}
