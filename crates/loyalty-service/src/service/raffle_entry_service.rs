//! 抽奖券账本
//!
//! 购买抽奖券时，限购校验、积分扣减、抽奖券写入与 `total_entries` 累加
//! 作为一个提交下发给存储层，任何一步失败都不会留下部分写入。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use taproom_shared::observability::metrics;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::models::{EntrantSummary, PointsReason, Raffle, RaffleEntry, check_entry_limit};
use crate::notification::NotificationSender;
use crate::repository::{AccountRepositoryTrait, PurchaseCommit, RaffleRepositoryTrait};

use super::dto::{PurchaseResult, UserEntries};
use super::points_ledger::PointsLedger;
use super::storage::StorageExecutor;

/// 幂等键派生抽奖券 ID 使用的命名空间
const ENTRY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b7d_4c3a_8e5f_0d2b_7a91_c468);

pub struct RaffleEntryLedger {
    accounts: Arc<dyn AccountRepositoryTrait>,
    raffles: Arc<dyn RaffleRepositoryTrait>,
    notifier: NotificationSender,
    executor: StorageExecutor,
}

impl RaffleEntryLedger {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        raffles: Arc<dyn RaffleRepositoryTrait>,
        notifier: NotificationSender,
        executor: StorageExecutor,
    ) -> Self {
        Self {
            accounts,
            raffles,
            notifier,
            executor,
        }
    }

    /// 由幂等键确定抽奖券 ID；未提供时生成新 ID
    pub fn entry_id_for(user_id: &str, raffle_id: Uuid, idempotency_key: Option<&str>) -> Uuid {
        match idempotency_key {
            Some(key) => Uuid::new_v5(
                &ENTRY_NAMESPACE,
                format!("{}:{}:{}", user_id, raffle_id, key).as_bytes(),
            ),
            None => Uuid::now_v7(),
        }
    }

    /// 购买抽奖券
    #[instrument(skip(self))]
    pub async fn purchase_entries(
        &self,
        user_id: &str,
        raffle_id: Uuid,
        entries_count: i64,
        idempotency_key: Option<&str>,
    ) -> Result<PurchaseResult> {
        if entries_count <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "抽奖券数量必须为正数: {}",
                entries_count
            )));
        }

        let start = Instant::now();
        let entry_id = Self::entry_id_for(user_id, raffle_id, idempotency_key);

        if idempotency_key.is_some()
            && let Some(existing) = self.find_entry(entry_id).await?
        {
            info!(user_id, entry_id = %entry_id, "重放的购买请求，返回已有记录");
            return self.replay(existing, true).await;
        }

        let result = self
            .executor
            .with_retry("purchase_entries", || {
                self.attempt_purchase(user_id, raffle_id, entries_count, entry_id)
            })
            .await;

        let result = match result {
            Ok(r) => Ok(r),
            Err(LoyaltyError::DuplicateEntry(_)) => match self.find_entry(entry_id).await? {
                Some(existing) => self.replay(existing, true).await,
                None => Err(LoyaltyError::Internal(format!(
                    "抽奖券 {} 冲突但无法读取",
                    entry_id
                ))),
            },
            Err(e @ LoyaltyError::StorageUnavailable(_)) => {
                // 结果未知：确认是否已落库，避免调用方重试造成重复扣费
                match self.find_entry(entry_id).await {
                    Ok(Some(existing)) => self.replay(existing, false).await,
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        };
        metrics::record_operation_duration("purchase_entries", start.elapsed().as_secs_f64());

        match &result {
            Ok(r) if !r.replayed => {
                metrics::record_raffle_entries(entries_count as u64);
                metrics::record_points_transaction(PointsReason::RaffleEntry.as_str());
                info!(
                    user_id,
                    entries_count,
                    total_entries = r.total_entries,
                    new_balance = r.new_balance,
                    "抽奖券购买成功"
                );
                self.notifier
                    .send_entries_purchased(user_id, raffle_id, entries_count, r.total_entries);
            }
            Ok(_) => {}
            Err(e) if e.is_business_error() => {
                metrics::record_raffle_rejection(e.error_code());
                info!(user_id, entries_count, error = %e, "抽奖券购买被拒绝");
            }
            Err(e) => warn!(user_id, entries_count, error = %e, "抽奖券购买失败"),
        }
        result
    }

    async fn attempt_purchase(
        &self,
        user_id: &str,
        raffle_id: Uuid,
        entries_count: i64,
        entry_id: Uuid,
    ) -> Result<PurchaseResult> {
        let now = Utc::now();
        let raffle = self.load_raffle(raffle_id).await?;
        raffle.ensure_open(now)?;

        let current = self
            .executor
            .timed(
                "user_entry_count",
                self.raffles.user_entry_count(raffle_id, user_id),
            )
            .await?;
        check_entry_limit(current, entries_count, raffle.max_entries_per_user)?;

        let cost = raffle.cost_for(entries_count)?;
        let account = self
            .executor
            .timed("get_account", self.accounts.get_account(user_id))
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;
        let points = PointsLedger::prepare(
            &account,
            -cost,
            PointsReason::RaffleEntry,
            Some(raffle_id.to_string()),
            now,
        )?;

        let entry = RaffleEntry {
            id: entry_id,
            raffle_id,
            user_id: user_id.to_string(),
            entries_count,
            points_spent: cost,
            created_at: now,
        };
        let new_balance = points.new_balance;
        let commit = PurchaseCommit {
            points,
            entry,
            expected_user_entries: current,
            max_entries_per_user: raffle.max_entries_per_user,
            now,
        };
        let total_entries = self
            .executor
            .timed("commit_purchase", self.raffles.commit_purchase(&commit))
            .await?;

        Ok(PurchaseResult {
            raffle_entry: commit.entry,
            total_entries,
            new_balance,
            replayed: false,
        })
    }

    /// 按用户聚合的参与者列表，按首次购买时间排序
    pub async fn get_entrants(&self, raffle_id: Uuid) -> Result<Vec<EntrantSummary>> {
        self.load_raffle(raffle_id).await?;
        self.executor
            .timed("list_entrants", self.raffles.list_entrants(raffle_id))
            .await
    }

    pub async fn get_user_entries(&self, raffle_id: Uuid, user_id: &str) -> Result<UserEntries> {
        self.load_raffle(raffle_id).await?;
        let entries = self
            .executor
            .timed(
                "list_user_entries",
                self.raffles.list_user_entries(raffle_id, user_id),
            )
            .await?;
        Ok(UserEntries {
            raffle_id,
            user_id: user_id.to_string(),
            total_entries: entries.iter().map(|e| e.entries_count).sum(),
            entries,
        })
    }

    /// 以已落库的抽奖券构造结果
    async fn replay(&self, entry: RaffleEntry, replayed: bool) -> Result<PurchaseResult> {
        let raffle = self.load_raffle(entry.raffle_id).await?;
        let balance = self
            .executor
            .timed("get_account", self.accounts.get_account(&entry.user_id))
            .await?
            .map(|a| a.point_balance)
            .unwrap_or_default();
        Ok(PurchaseResult {
            raffle_entry: entry,
            total_entries: raffle.total_entries,
            new_balance: balance,
            replayed,
        })
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<RaffleEntry>> {
        self.executor
            .timed("find_entry", self.raffles.find_entry(entry_id))
            .await
    }

    async fn load_raffle(&self, raffle_id: Uuid) -> Result<Raffle> {
        self.executor
            .timed("get_raffle", self.raffles.get_raffle(raffle_id))
            .await?
            .ok_or(LoyaltyError::RaffleNotFound(raffle_id))
    }
}
