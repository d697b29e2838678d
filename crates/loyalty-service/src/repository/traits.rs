//! 仓储 Trait 定义
//!
//! 服务层只依赖这些接口。所有写操作都以"提交"（commit）的形式下发，
//! 提交中携带前置条件，由具体后端在一个原子单元内校验并写入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CheckIn, CheckInStats, EntrantSummary, PointsReason, PointsTransaction, Raffle, RaffleEntry,
    RaffleStatus, UserAccount,
};

/// 积分变更提交
///
/// 仅当账户当前 `version == expected_version` 时写入 `new_balance`
/// 并追加 `transaction`，否则返回 `StorageConflict`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsCommit {
    pub expected_version: i64,
    pub new_balance: i64,
    pub transaction: PointsTransaction,
}

impl PointsCommit {
    pub fn user_id(&self) -> &str {
        &self.transaction.user_id
    }
}

/// 抽奖券购买提交
///
/// 在同一原子单元内：校验账户版本、抽奖状态与截止时间、用户已持有数量与限购，
/// 然后写入抽奖券、累加 `total_entries`、写入余额并追加 `raffle_entry` 流水。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCommit {
    pub points: PointsCommit,
    pub entry: RaffleEntry,
    /// 读取时该用户在此抽奖中已持有的数量
    pub expected_user_entries: i64,
    pub max_entries_per_user: i64,
    pub now: DateTime<Utc>,
}

/// 抽奖状态迁移
///
/// 仅当抽奖仍处于 active 时生效；若给出 `expected_total_entries`，
/// 还要求当前计数与之相等，否则返回 `StorageConflict`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleTransition {
    pub raffle_id: Uuid,
    pub to: RaffleStatus,
    pub expected_total_entries: Option<i64>,
    pub winner_user_id: Option<String>,
    pub draw_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

/// 待写入的签到
///
/// `dedupe_key` 存在时在存储层唯一，冲突返回 `DuplicateCheckIn`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckIn {
    pub check_in: CheckIn,
    pub dedupe_key: Option<String>,
}

/// 用户账户与积分账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    // 账户
    async fn create_account(&self, account: &UserAccount) -> Result<()>;
    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>>;
    async fn delete_account(&self, user_id: &str) -> Result<bool>;
    async fn list_account_ids(&self) -> Result<Vec<String>>;

    // 积分账本
    async fn commit_points(&self, commit: &PointsCommit) -> Result<()>;
    async fn find_transaction(
        &self,
        reason: PointsReason,
        related_entity_id: &str,
    ) -> Result<Option<PointsTransaction>>;
    async fn list_transactions(&self, user_id: &str, limit: i64)
    -> Result<Vec<PointsTransaction>>;
    /// 全量求和，仅供对账使用
    async fn sum_deltas(&self, user_id: &str) -> Result<i64>;

    // 成就（只增不减），返回合并后的完整集合
    async fn add_achievements(&self, user_id: &str, achievements: &[String])
    -> Result<Vec<String>>;
}

/// 签到仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckInRepositoryTrait: Send + Sync {
    async fn insert_check_in(&self, new_check_in: &NewCheckIn) -> Result<()>;
    async fn get_check_in(&self, id: Uuid) -> Result<Option<CheckIn>>;
    /// 删除尚未入账的签到，已入账则不删除并返回 false
    async fn delete_uncredited_check_in(&self, id: Uuid) -> Result<bool>;
    async fn check_in_stats(&self, user_id: &str) -> Result<CheckInStats>;
    async fn list_check_ins(&self, user_id: &str, limit: i64) -> Result<Vec<CheckIn>>;
    /// 账户仍存在、签到时间早于 `before` 且没有对应 checkin 流水的签到
    async fn list_uncredited_check_ins(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CheckIn>>;
}

/// 抽奖仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RaffleRepositoryTrait: Send + Sync {
    // 抽奖
    async fn create_raffle(&self, raffle: &Raffle) -> Result<()>;
    async fn get_raffle(&self, raffle_id: Uuid) -> Result<Option<Raffle>>;
    async fn list_raffle_ids(&self) -> Result<Vec<Uuid>>;
    async fn transition_raffle(&self, transition: &RaffleTransition) -> Result<Raffle>;

    // 抽奖券
    /// 原子提交一次购买，返回抽奖新的 `total_entries`
    async fn commit_purchase(&self, commit: &PurchaseCommit) -> Result<i64>;
    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<RaffleEntry>>;
    async fn user_entry_count(&self, raffle_id: Uuid, user_id: &str) -> Result<i64>;
    async fn list_user_entries(&self, raffle_id: Uuid, user_id: &str)
    -> Result<Vec<RaffleEntry>>;
    /// 按 (first_entry_at, user_id) 排序
    async fn list_entrants(&self, raffle_id: Uuid) -> Result<Vec<EntrantSummary>>;
    /// 全量求和，仅供对账使用
    async fn sum_entries(&self, raffle_id: Uuid) -> Result<i64>;
}
