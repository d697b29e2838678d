//! 签到服务
//!
//! ## 签到流程
//!
//! 1. 按重复签到策略写入签到记录（去重键唯一）
//! 2. 以 `reason=checkin` 入账积分
//! 3. 重新统计签到数据并评估成就
//! 4. 持久化新解锁的成就
//!
//! 第 2 步失败时删除尚未入账的签到记录；记录已被入账则按成功继续，删除失败则由对账任务补记积分。
//! 第 3、4 步失败不影响签到结果，成就可随时由统计数据重新评估。

use std::sync::Arc;

use chrono::Utc;
use taproom_shared::observability::metrics;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::achievement::{AchievementEngine, StatsSnapshot};
use crate::error::{LoyaltyError, Result};
use crate::models::{CheckIn, CheckInMethod, DuplicateWindow, PointsReason};
use crate::notification::NotificationSender;
use crate::repository::{AccountRepositoryTrait, CheckInRepositoryTrait, NewCheckIn};
use crate::settings::CheckInPolicy;

use super::dto::{CheckInResult, TransactionResult};
use super::points_ledger::PointsLedger;
use super::storage::StorageExecutor;

pub struct CheckInService {
    accounts: Arc<dyn AccountRepositoryTrait>,
    check_ins: Arc<dyn CheckInRepositoryTrait>,
    ledger: Arc<PointsLedger>,
    engine: AchievementEngine,
    notifier: NotificationSender,
    policy: CheckInPolicy,
    executor: StorageExecutor,
}

impl CheckInService {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        check_ins: Arc<dyn CheckInRepositoryTrait>,
        ledger: Arc<PointsLedger>,
        engine: AchievementEngine,
        notifier: NotificationSender,
        policy: CheckInPolicy,
        executor: StorageExecutor,
    ) -> Self {
        Self {
            accounts,
            check_ins,
            ledger,
            engine,
            notifier,
            policy,
            executor,
        }
    }

    /// 处理一次场馆签到
    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        user_id: &str,
        venue_id: &str,
        method: CheckInMethod,
        venue_points_reward: i64,
    ) -> Result<CheckInResult> {
        let result = self
            .do_check_in(user_id, venue_id, method, venue_points_reward)
            .await;
        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_check_in(method.as_str(), status);
        result
    }

    async fn do_check_in(
        &self,
        user_id: &str,
        venue_id: &str,
        method: CheckInMethod,
        venue_points_reward: i64,
    ) -> Result<CheckInResult> {
        if venue_points_reward <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "场馆奖励积分必须为正数: {}",
                venue_points_reward
            )));
        }
        self.executor
            .timed("get_account", self.accounts.get_account(user_id))
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;

        let check_in = CheckIn {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            venue_id: venue_id.to_string(),
            points_awarded: venue_points_reward,
            method,
            checked_in_at: Utc::now(),
        };
        self.persist_check_in(&check_in).await?;

        let credit = match self.credit(&check_in).await {
            Ok(credit) => credit,
            Err(e) => self.compensate(&check_in, e).await?,
        };

        let new_achievements = match self.refresh_achievements(user_id).await {
            Ok(unlocked) => unlocked,
            Err(e) => {
                warn!(user_id, error = %e, "成就评估失败，签到与积分保持有效");
                Vec::new()
            }
        };

        info!(
            check_in_id = %check_in.id,
            user_id,
            venue_id,
            points = venue_points_reward,
            new_balance = credit.new_balance,
            achievements = ?new_achievements,
            "签到成功"
        );
        self.notifier
            .send_points_credited(user_id, venue_points_reward, credit.new_balance);
        self.notifier
            .send_achievements_unlocked(user_id, &new_achievements);

        Ok(CheckInResult {
            check_in,
            points_awarded: venue_points_reward,
            new_balance: credit.new_balance,
            new_achievements,
        })
    }

    /// 为签到入账，已入账时返回已有流水
    pub async fn credit(&self, check_in: &CheckIn) -> Result<TransactionResult> {
        let related = check_in.id.to_string();
        let result = self
            .ledger
            .apply_transaction(
                &check_in.user_id,
                check_in.points_awarded,
                PointsReason::Checkin,
                Some(related.clone()),
            )
            .await;

        match result {
            Ok(credit) => Ok(credit),
            Err(LoyaltyError::DuplicateTransaction { .. }) => self.existing_credit(&related).await,
            Err(e @ LoyaltyError::StorageUnavailable(_)) => {
                // 结果未知：确认是否已落库
                match self.find_credit(&related).await {
                    Ok(Some(credit)) => Ok(credit),
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// 按统计数据重新评估成就，返回本次新增的成就
    pub async fn refresh_achievements(&self, user_id: &str) -> Result<Vec<String>> {
        let stats = self
            .executor
            .timed("check_in_stats", self.check_ins.check_in_stats(user_id))
            .await?;
        let account = self
            .executor
            .timed("get_account", self.accounts.get_account(user_id))
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;

        let snapshot = StatsSnapshot {
            stats,
            unlocked: account.achievements,
        };
        let unlocked = self.engine.evaluate(user_id, &snapshot);
        if unlocked.is_empty() {
            return Ok(unlocked);
        }

        self.executor
            .timed(
                "add_achievements",
                self.accounts.add_achievements(user_id, &unlocked),
            )
            .await?;
        Ok(unlocked)
    }

    pub async fn list_check_ins(&self, user_id: &str, limit: i64) -> Result<Vec<CheckIn>> {
        self.executor
            .timed(
                "list_check_ins",
                self.check_ins.list_check_ins(user_id, limit.clamp(1, 500)),
            )
            .await
    }

    fn dedupe_key(&self, check_in: &CheckIn) -> Option<String> {
        match self.policy.window {
            DuplicateWindow::None => None,
            DuplicateWindow::CalendarDay => Some(check_in.daily_dedupe_key(self.policy.utc_offset)),
        }
    }

    async fn persist_check_in(&self, check_in: &CheckIn) -> Result<()> {
        let new_check_in = NewCheckIn {
            check_in: check_in.clone(),
            dedupe_key: self.dedupe_key(check_in),
        };
        match self
            .executor
            .timed("insert_check_in", self.check_ins.insert_check_in(&new_check_in))
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ LoyaltyError::StorageUnavailable(_)) => {
                match self
                    .executor
                    .timed("get_check_in", self.check_ins.get_check_in(check_in.id))
                    .await
                {
                    Ok(Some(_)) => Ok(()),
                    _ => Err(e),
                }
            }
            Err(e) => {
                if matches!(e, LoyaltyError::DuplicateCheckIn { .. }) {
                    info!(user_id = %check_in.user_id, venue_id = %check_in.venue_id, "重复签到被拒绝");
                }
                Err(e)
            }
        }
    }

    /// 入账失败后撤销签到记录
    ///
    /// 记录无法撤销说明积分已经入账（迟到的提交或对账补记），此时以该笔流水继续完成签到
    async fn compensate(
        &self,
        check_in: &CheckIn,
        cause: LoyaltyError,
    ) -> Result<TransactionResult> {
        match self
            .executor
            .timed(
                "delete_uncredited_check_in",
                self.check_ins.delete_uncredited_check_in(check_in.id),
            )
            .await
        {
            Ok(true) => {
                warn!(
                    check_in_id = %check_in.id,
                    error = %cause,
                    "积分入账失败，已撤销签到记录"
                );
                Err(cause)
            }
            Ok(false) => match self.find_credit(&check_in.id.to_string()).await {
                Ok(Some(credit)) => {
                    info!(
                        check_in_id = %check_in.id,
                        new_balance = credit.new_balance,
                        "入账结果延迟确认，签到继续完成"
                    );
                    Ok(credit)
                }
                Ok(None) => {
                    warn!(
                        check_in_id = %check_in.id,
                        error = %cause,
                        "积分入账失败，签到记录不存在"
                    );
                    Err(cause)
                }
                Err(e) => {
                    error!(
                        check_in_id = %check_in.id,
                        error = %cause,
                        recheck_error = %e,
                        "签到记录已入账但无法读取流水，交由对账任务核对"
                    );
                    Err(cause)
                }
            },
            Err(e) => {
                error!(
                    check_in_id = %check_in.id,
                    error = %cause,
                    compensation_error = %e,
                    "积分入账失败且撤销签到失败，交由对账任务补记积分"
                );
                Err(cause)
            }
        }
    }

    async fn find_credit(&self, related: &str) -> Result<Option<TransactionResult>> {
        let tx = self
            .executor
            .timed(
                "find_transaction",
                self.accounts.find_transaction(PointsReason::Checkin, related),
            )
            .await?;
        Ok(tx.map(|transaction| TransactionResult {
            new_balance: transaction.balance_after,
            transaction,
        }))
    }

    async fn existing_credit(&self, related: &str) -> Result<TransactionResult> {
        self.find_credit(related).await?.ok_or_else(|| {
            LoyaltyError::Internal(format!("签到 {} 入账记录冲突但无法读取", related))
        })
    }
}
