//! 积分与抽奖服务错误类型
//!
//! 定义服务层的业务错误和存储错误

use thiserror::Error;
use uuid::Uuid;

/// 积分与抽奖服务错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // === 积分相关错误 ===
    #[error("积分不足: 需要 {required}, 可用 {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("用户账户不存在: {0}")]
    AccountNotFound(String),

    #[error("用户账户已存在: {0}")]
    AccountAlreadyExists(String),

    #[error("积分流水已存在: reason={reason}, related_entity_id={related_entity_id}")]
    DuplicateTransaction {
        reason: String,
        related_entity_id: String,
    },

    // === 签到相关错误 ===
    #[error("重复签到: user_id={user_id}, venue_id={venue_id}")]
    DuplicateCheckIn { user_id: String, venue_id: String },

    #[error("场馆不存在: {0}")]
    VenueNotFound(String),

    // === 抽奖相关错误 ===
    #[error("抽奖不存在: {0}")]
    RaffleNotFound(Uuid),

    #[error("抽奖未处于进行中: {0}")]
    RaffleNotActive(Uuid),

    #[error("抽奖已开奖: {0}")]
    RaffleAlreadyClosed(Uuid),

    #[error("抽奖没有任何参与记录: {0}")]
    NoEntries(Uuid),

    #[error("超出每人限购: 上限 {max}, 已持有 {current}, 本次 {requested}")]
    EntryLimitExceeded {
        max: i64,
        current: i64,
        requested: i64,
    },

    #[error("抽奖券记录已存在: {0}")]
    DuplicateEntry(Uuid),

    // === 存储错误 ===
    #[error("并发冲突，请重试")]
    StorageConflict,

    #[error("存储不可用: {0}")]
    StorageUnavailable(String),

    // === 通用错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分与抽奖服务 Result 类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 检查是否为可在服务内部自动重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageConflict)
    }

    /// 检查是否为业务规则错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::StorageConflict | Self::StorageUnavailable(_) | Self::Internal(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountAlreadyExists(_) => "ACCOUNT_ALREADY_EXISTS",
            Self::DuplicateTransaction { .. } => "DUPLICATE_TRANSACTION",
            Self::DuplicateCheckIn { .. } => "DUPLICATE_CHECK_IN",
            Self::VenueNotFound(_) => "VENUE_NOT_FOUND",
            Self::RaffleNotFound(_) => "RAFFLE_NOT_FOUND",
            Self::RaffleNotActive(_) => "RAFFLE_NOT_ACTIVE",
            Self::RaffleAlreadyClosed(_) => "RAFFLE_ALREADY_CLOSED",
            Self::NoEntries(_) => "NO_ENTRIES",
            Self::EntryLimitExceeded { .. } => "ENTRY_LIMIT_EXCEEDED",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::StorageConflict => "STORAGE_CONFLICT",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// 从 sqlx 错误转换
///
/// 序列化失败、死锁与 NOWAIT 锁不可用视为并发冲突，其余视为存储不可用。
/// 唯一约束冲突由各仓储按约束名映射为对应的业务错误。
impl From<sqlx::Error> for LoyaltyError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && let Some(code) = db_err.code()
            && matches!(code.as_ref(), "40001" | "40P01" | "55P03")
        {
            return Self::StorageConflict;
        }
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for LoyaltyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// 返回违反的唯一约束名（仅当错误为唯一约束冲突时）
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}
