//! 账户与积分 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::info;
use validator::Validate;

use crate::http::dto::{
    AdjustPointsRequest, ApiResponse, BalanceResponse, CreateAccountRequest, LimitQuery,
};
use crate::http::error::ApiResult;
use crate::http::state::AppState;
use crate::models::{PointsTransaction, UserAccount};
use crate::service::dto::TransactionResult;

const DEFAULT_TRANSACTION_LIMIT: i64 = 50;

/// 创建账户
///
/// POST /api/accounts
pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> ApiResult<Json<ApiResponse<UserAccount>>> {
    req.validate()?;
    let account = state.api.create_account(req.user_id.trim()).await?;
    info!(user_id = %account.user_id, "账户已创建");
    Ok(Json(ApiResponse::success(account)))
}

/// 注销账户，剩余积分作废
///
/// DELETE /api/accounts/{userId}
pub async fn delete_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.api.delete_account(&user_id).await?;
    Ok(Json(ApiResponse::empty()))
}

/// GET /api/accounts/{userId}/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ApiResponse<BalanceResponse>>> {
    let point_balance = state.api.get_balance(&user_id).await?;
    Ok(Json(ApiResponse::success(BalanceResponse {
        user_id,
        point_balance,
    })))
}

/// GET /api/accounts/{userId}/transactions?limit=
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse<Vec<PointsTransaction>>>> {
    let limit = query.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT);
    let transactions = state.api.list_transactions(&user_id, limit).await?;
    Ok(Json(ApiResponse::success(transactions)))
}

/// 运营调整积分
///
/// POST /api/accounts/{userId}/adjustments
pub async fn adjust_points(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AdjustPointsRequest>,
) -> ApiResult<Json<ApiResponse<TransactionResult>>> {
    req.validate()?;
    let result = state
        .api
        .adjust_points(&user_id, req.delta, req.note.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
