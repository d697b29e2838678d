//! 运维 API 处理器

use axum::{Json, extract::State};

use crate::http::dto::ApiResponse;
use crate::http::error::ApiResult;
use crate::http::state::AppState;
use crate::service::ReconciliationReport;

/// 立即执行一次对账，只报告不修复余额
///
/// POST /api/admin/reconciliation
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ReconciliationReport>>> {
    let report = state.api.run_reconciliation().await?;
    Ok(Json(ApiResponse::success(report)))
}

/// 存活探针
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "loyalty-service"
    }))
}
