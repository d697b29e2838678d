//! 用户账户与积分流水实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PointsReason;

/// 用户积分账户
///
/// `point_balance` 是积分流水的物化视图，只能经由积分账本事务修改。
/// `version` 在每次余额写入时递增，用于乐观并发控制。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user_id: String,
    pub point_balance: i64,
    #[serde(skip)]
    pub version: i64,
    /// 已解锁成就（只增不减）
    pub achievements: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// 注册时创建的空账户
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            point_balance: 0,
            version: 0,
            achievements: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_achievement(&self, achievement_id: &str) -> bool {
        self.achievements.iter().any(|a| a == achievement_id)
    }
}

/// 积分流水
///
/// 只追加，不修改也不删除。任一用户 `sum(delta) == point_balance`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    pub id: Uuid,
    pub user_id: String,
    /// 正数为入账，负数为扣减
    pub delta: i64,
    pub reason: PointsReason,
    /// 签到 ID 或抽奖 ID
    #[sqlx(default)]
    pub related_entity_id: Option<String>,
    /// 本笔流水入账后的余额
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_empty() {
        let account = UserAccount::new("user-1", Utc::now());
        assert_eq!(account.point_balance, 0);
        assert_eq!(account.version, 0);
        assert!(account.achievements.is_empty());
        assert!(!account.has_achievement("first_checkin"));
    }

    #[test]
    fn test_version_not_serialized() {
        let mut account = UserAccount::new("user-1", Utc::now());
        account.version = 42;
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("version").is_none());
        assert_eq!(json["pointBalance"], 0);
    }
}
