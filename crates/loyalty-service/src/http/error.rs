//! HTTP 错误映射
//!
//! 业务冲突返回 409，资源不存在 404，参数错误 400，存储不可用 503

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::LoyaltyError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),

    #[error("参数验证失败: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        let err = match self {
            Self::Validation(_) => return StatusCode::BAD_REQUEST,
            Self::Loyalty(err) => err,
        };

        match err {
            LoyaltyError::Validation(_) => StatusCode::BAD_REQUEST,

            LoyaltyError::AccountNotFound(_)
            | LoyaltyError::VenueNotFound(_)
            | LoyaltyError::RaffleNotFound(_) => StatusCode::NOT_FOUND,

            LoyaltyError::InsufficientFunds { .. }
            | LoyaltyError::AccountAlreadyExists(_)
            | LoyaltyError::DuplicateTransaction { .. }
            | LoyaltyError::DuplicateCheckIn { .. }
            | LoyaltyError::RaffleNotActive(_)
            | LoyaltyError::RaffleAlreadyClosed(_)
            | LoyaltyError::NoEntries(_)
            | LoyaltyError::EntryLimitExceeded { .. }
            | LoyaltyError::DuplicateEntry(_)
            | LoyaltyError::StorageConflict => StatusCode::CONFLICT,

            LoyaltyError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LoyaltyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Loyalty(err) => err.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 基础设施错误只返回通用提示，详细信息写日志
        let message = match &self {
            Self::Loyalty(LoyaltyError::StorageUnavailable(e)) => {
                tracing::error!(error = %e, "存储不可用");
                "存储暂时不可用，请稍后重试".to_string()
            }
            Self::Loyalty(LoyaltyError::Internal(e)) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                LoyaltyError::InsufficientFunds {
                    required: 10,
                    available: 5,
                },
                StatusCode::CONFLICT,
            ),
            (
                LoyaltyError::RaffleAlreadyClosed(Uuid::nil()),
                StatusCode::CONFLICT,
            ),
            (
                LoyaltyError::AccountNotFound("u1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                LoyaltyError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LoyaltyError::StorageUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                LoyaltyError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_error_code_passthrough() {
        let err = ApiError::from(LoyaltyError::NoEntries(Uuid::nil()));
        assert_eq!(err.error_code(), "NO_ENTRIES");
        assert_eq!(ApiError::Validation("x".into()).error_code(), "VALIDATION_ERROR");
    }
}
