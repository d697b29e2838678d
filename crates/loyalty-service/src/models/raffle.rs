//! 抽奖与抽奖券实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::RaffleStatus;
use crate::error::{LoyaltyError, Result};

/// 抽奖活动
///
/// `total_entries` 是抽奖券记录的物化计数，只能在写入抽奖券的同一原子操作中递增
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Raffle {
    pub id: Uuid,
    pub prize_name: String,
    /// 每张抽奖券消耗的积分
    pub cost_per_entry: i64,
    /// 每人最多持有的抽奖券数量
    pub max_entries_per_user: i64,
    pub end_at: DateTime<Utc>,
    pub status: RaffleStatus,
    pub total_entries: i64,
    #[sqlx(default)]
    pub winner_user_id: Option<String>,
    /// 完成开奖的那次开奖操作标识
    #[sqlx(default)]
    pub draw_id: Option<Uuid>,
    #[sqlx(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Raffle {
    pub fn new(
        prize_name: impl Into<String>,
        cost_per_entry: i64,
        max_entries_per_user: i64,
        end_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            prize_name: prize_name.into(),
            cost_per_entry,
            max_entries_per_user,
            end_at,
            status: RaffleStatus::Active,
            total_entries: 0,
            winner_user_id: None,
            draw_id: None,
            closed_at: None,
            created_at: now,
        }
    }

    /// 检查是否仍可购买抽奖券
    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<()> {
        if self.status != RaffleStatus::Active || now >= self.end_at {
            return Err(LoyaltyError::RaffleNotActive(self.id));
        }
        Ok(())
    }

    /// 检查是否仍可开奖或取消
    pub fn ensure_active(&self) -> Result<()> {
        match self.status {
            RaffleStatus::Active => Ok(()),
            RaffleStatus::Closed => Err(LoyaltyError::RaffleAlreadyClosed(self.id)),
            RaffleStatus::Cancelled => Err(LoyaltyError::RaffleNotActive(self.id)),
        }
    }

    /// 购买指定数量抽奖券所需积分
    pub fn cost_for(&self, entries_count: i64) -> Result<i64> {
        entries_count
            .checked_mul(self.cost_per_entry)
            .ok_or_else(|| LoyaltyError::Validation("抽奖券数量过大".to_string()))
    }
}

/// 校验本次购买后是否超出每人上限，求和溢出同样视为超限
pub fn check_entry_limit(current: i64, requested: i64, max: i64) -> Result<()> {
    if current.checked_add(requested).is_none_or(|total| total > max) {
        return Err(LoyaltyError::EntryLimitExceeded {
            max,
            current,
            requested,
        });
    }
    Ok(())
}

/// 抽奖券购买记录
///
/// 每次购买追加一条，`points_spent == entries_count * cost_per_entry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RaffleEntry {
    pub id: Uuid,
    pub raffle_id: Uuid,
    pub user_id: String,
    pub entries_count: i64,
    pub points_spent: i64,
    pub created_at: DateTime<Utc>,
}

/// 按用户聚合的参与信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EntrantSummary {
    pub user_id: String,
    pub total_entries: i64,
    pub first_entry_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn raffle() -> Raffle {
        let now = Utc::now();
        Raffle::new("Growler of IPA", 20, 5, now + Duration::days(7), now)
    }

    #[test]
    fn test_open_raffle_accepts_purchase() {
        let r = raffle();
        assert!(r.ensure_open(Utc::now()).is_ok());
    }

    #[test]
    fn test_expired_raffle_rejects_purchase() {
        let r = raffle();
        let err = r.ensure_open(r.end_at).unwrap_err();
        assert!(matches!(err, LoyaltyError::RaffleNotActive(_)));
    }

    #[test]
    fn test_terminal_status_errors() {
        let mut r = raffle();
        r.status = RaffleStatus::Closed;
        assert!(matches!(
            r.ensure_active(),
            Err(LoyaltyError::RaffleAlreadyClosed(_))
        ));
        assert!(r.ensure_open(Utc::now()).is_err());

        r.status = RaffleStatus::Cancelled;
        assert!(matches!(
            r.ensure_active(),
            Err(LoyaltyError::RaffleNotActive(_))
        ));
    }

    #[test]
    fn test_entry_limit_boundaries() {
        assert!(check_entry_limit(3, 2, 5).is_ok());
        assert!(matches!(
            check_entry_limit(3, 3, 5),
            Err(LoyaltyError::EntryLimitExceeded {
                max: 5,
                current: 3,
                requested: 3
            })
        ));
        assert!(matches!(
            check_entry_limit(1, i64::MAX, 5),
            Err(LoyaltyError::EntryLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_cost_overflow_is_validation_error() {
        let r = raffle();
        assert_eq!(r.cost_for(3).unwrap(), 60);
        assert!(matches!(
            r.cost_for(i64::MAX),
            Err(LoyaltyError::Validation(_))
        ));
    }
}
