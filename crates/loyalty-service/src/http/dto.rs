//! 请求与响应结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::CheckInMethod;
use crate::service::dto::NewRaffle;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// 成功但无数据
    pub fn empty() -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 128, message = "用户 ID 长度必须在 1-128 之间"))]
    pub user_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPointsRequest {
    pub delta: i64,
    #[validate(length(max = 256, message = "备注不能超过 256 个字符"))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    #[validate(length(min = 1, max = 128, message = "用户 ID 长度必须在 1-128 之间"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 128, message = "场馆 ID 长度必须在 1-128 之间"))]
    pub venue_id: String,
    pub method: CheckInMethod,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRaffleRequest {
    #[validate(length(min = 1, max = 256, message = "奖品名称长度必须在 1-256 之间"))]
    pub prize_name: String,
    #[validate(range(min = 1, message = "每张抽奖券积分必须为正数"))]
    pub cost_per_entry: i64,
    #[validate(range(min = 1, message = "每人限购数量必须为正数"))]
    pub max_entries_per_user: i64,
    pub end_at: DateTime<Utc>,
}

impl From<CreateRaffleRequest> for NewRaffle {
    fn from(req: CreateRaffleRequest) -> Self {
        Self {
            prize_name: req.prize_name,
            cost_per_entry: req.cost_per_entry,
            max_entries_per_user: req.max_entries_per_user,
            end_at: req.end_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEntriesRequest {
    #[validate(length(min = 1, max = 128, message = "用户 ID 长度必须在 1-128 之间"))]
    pub user_id: String,
    #[validate(range(min = 1, message = "购买数量必须为正数"))]
    pub entries_count: i64,
    #[validate(length(min = 1, max = 128, message = "幂等键长度必须在 1-128 之间"))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertVenueRequest {
    #[validate(length(min = 1, max = 256, message = "场馆名称长度必须在 1-256 之间"))]
    pub name: String,
    #[validate(range(min = 1, message = "签到奖励积分必须为正数"))]
    pub points_reward: i64,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntriesQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub point_balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_request_validation() {
        let req: PurchaseEntriesRequest =
            serde_json::from_str(r#"{"userId":"u1","entriesCount":0}"#).unwrap();
        assert!(req.validate().is_err());

        let req: PurchaseEntriesRequest = serde_json::from_str(
            r#"{"userId":"u1","entriesCount":3,"idempotencyKey":"k-1"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.idempotency_key.as_deref(), Some("k-1"));
    }

    #[test]
    fn test_empty_response_omits_data() {
        let body = serde_json::to_value(ApiResponse::empty()).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("data").is_none());
    }
}
