//! 服务层输入输出结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CheckIn, PointsTransaction, Raffle, RaffleEntry};

/// 积分变动结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub new_balance: i64,
    pub transaction: PointsTransaction,
}

/// 签到结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResult {
    pub check_in: CheckIn,
    pub points_awarded: i64,
    pub new_balance: i64,
    pub new_achievements: Vec<String>,
}

/// 抽奖券购买结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub raffle_entry: RaffleEntry,
    pub total_entries: i64,
    pub new_balance: i64,
    /// 相同幂等键的重放请求，未重复扣费
    pub replayed: bool,
}

/// 开奖结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResult {
    pub raffle_id: Uuid,
    pub draw_id: Uuid,
    pub winner_user_id: String,
    pub total_entries: i64,
    /// 中奖券号，`[0, total_entries)`；经重新读取确认的结果为空
    pub winning_ticket: Option<u64>,
}

/// 某用户在某抽奖中的持券情况
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntries {
    pub raffle_id: Uuid,
    pub user_id: String,
    pub total_entries: i64,
    pub entries: Vec<RaffleEntry>,
}

/// 创建抽奖的参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRaffle {
    pub prize_name: String,
    pub cost_per_entry: i64,
    pub max_entries_per_user: i64,
    pub end_at: DateTime<Utc>,
}

impl NewRaffle {
    pub fn into_raffle(self, now: DateTime<Utc>) -> Raffle {
        Raffle::new(
            self.prize_name.trim(),
            self.cost_per_entry,
            self.max_entries_per_user,
            self.end_at,
            now,
        )
    }
}
