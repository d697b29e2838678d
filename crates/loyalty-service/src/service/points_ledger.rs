//! 积分账本服务
//!
//! 用户余额的唯一写入入口。每次变动执行「读取余额与版本 -> 计算 -> 条件写入」，
//! 版本冲突时从读取重新开始，余额与流水在同一提交中落库。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use taproom_shared::observability::metrics;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::models::{PointsReason, PointsTransaction, UserAccount};
use crate::repository::{AccountRepositoryTrait, PointsCommit};

use super::dto::TransactionResult;
use super::storage::StorageExecutor;

pub struct PointsLedger {
    accounts: Arc<dyn AccountRepositoryTrait>,
    executor: StorageExecutor,
}

impl PointsLedger {
    pub fn new(accounts: Arc<dyn AccountRepositoryTrait>, executor: StorageExecutor) -> Self {
        Self { accounts, executor }
    }

    /// 基于已读取的账户构造积分提交
    ///
    /// 扣减后余额为负时返回 `InsufficientFunds`
    pub fn prepare(
        account: &UserAccount,
        delta: i64,
        reason: PointsReason,
        related_entity_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PointsCommit> {
        if delta == 0 {
            return Err(LoyaltyError::Validation("积分变动不能为 0".to_string()));
        }
        let new_balance = account
            .point_balance
            .checked_add(delta)
            .ok_or_else(|| LoyaltyError::Validation("积分变动超出范围".to_string()))?;
        if new_balance < 0 {
            return Err(LoyaltyError::InsufficientFunds {
                required: -delta,
                available: account.point_balance,
            });
        }

        Ok(PointsCommit {
            expected_version: account.version,
            new_balance,
            transaction: PointsTransaction {
                id: Uuid::now_v7(),
                user_id: account.user_id.clone(),
                delta,
                reason,
                related_entity_id,
                balance_after: new_balance,
                created_at: now,
            },
        })
    }

    /// 原子地应用一笔积分变动
    #[instrument(skip(self))]
    pub async fn apply_transaction(
        &self,
        user_id: &str,
        delta: i64,
        reason: PointsReason,
        related_entity_id: Option<String>,
    ) -> Result<TransactionResult> {
        let start = Instant::now();
        let result = self
            .executor
            .with_retry("apply_transaction", || {
                let related_entity_id = related_entity_id.clone();
                async move {
                    let account = self.load_account(user_id).await?;
                    let commit =
                        Self::prepare(&account, delta, reason, related_entity_id, Utc::now())?;
                    self.executor
                        .timed("commit_points", self.accounts.commit_points(&commit))
                        .await?;
                    Ok(TransactionResult {
                        new_balance: commit.new_balance,
                        transaction: commit.transaction,
                    })
                }
            })
            .await;
        metrics::record_operation_duration("apply_transaction", start.elapsed().as_secs_f64());

        match &result {
            Ok(r) => {
                metrics::record_points_transaction(reason.as_str());
                info!(user_id, delta, new_balance = r.new_balance, "积分变动成功");
            }
            Err(e) if e.is_business_error() => {
                info!(user_id, delta, error = %e, "积分变动被拒绝");
            }
            Err(e) => warn!(user_id, delta, error = %e, "积分变动失败"),
        }
        result
    }

    /// 读取物化余额，不汇总流水
    pub async fn get_balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.load_account(user_id).await?.point_balance)
    }

    pub async fn get_account(&self, user_id: &str) -> Result<UserAccount> {
        self.load_account(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn create_account(&self, user_id: &str) -> Result<UserAccount> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(LoyaltyError::Validation("userId 不能为空".to_string()));
        }
        let account = UserAccount::new(user_id, Utc::now());
        self.executor
            .timed("create_account", self.accounts.create_account(&account))
            .await?;
        info!(user_id, "账户已创建");
        Ok(account)
    }

    /// 删除账户，余额作废，流水保留
    #[instrument(skip(self))]
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        let account = self.load_account(user_id).await?;
        let deleted = self
            .executor
            .timed("delete_account", self.accounts.delete_account(user_id))
            .await?;
        if !deleted {
            return Err(LoyaltyError::AccountNotFound(user_id.to_string()));
        }
        info!(user_id, forfeited = account.point_balance, "账户已删除");
        Ok(())
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>> {
        self.load_account(user_id).await?;
        self.executor
            .timed(
                "list_transactions",
                self.accounts.list_transactions(user_id, limit.clamp(1, 500)),
            )
            .await
    }

    async fn load_account(&self, user_id: &str) -> Result<UserAccount> {
        self.executor
            .timed("get_account", self.accounts.get_account(user_id))
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockAccountRepositoryTrait;
    use taproom_shared::retry::RetryPolicy;
    use std::time::Duration;

    fn account(balance: i64, version: i64) -> UserAccount {
        UserAccount {
            point_balance: balance,
            version,
            ..UserAccount::new("u1", Utc::now())
        }
    }

    fn ledger(repo: MockAccountRepositoryTrait, retries: u32) -> PointsLedger {
        PointsLedger::new(
            Arc::new(repo),
            StorageExecutor::new(
                RetryPolicy::from_millis(retries, 0, 0),
                Duration::from_secs(1),
            ),
        )
    }

    #[test]
    fn test_prepare_rejects_overdraft() {
        let err = PointsLedger::prepare(&account(50, 3), -60, PointsReason::RaffleEntry, None, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            LoyaltyError::InsufficientFunds {
                required: 60,
                available: 50
            }
        ));
    }

    #[test]
    fn test_prepare_builds_commit() {
        let commit =
            PointsLedger::prepare(&account(50, 3), -20, PointsReason::RaffleEntry, None, Utc::now())
                .unwrap();
        assert_eq!(commit.expected_version, 3);
        assert_eq!(commit.new_balance, 30);
        assert_eq!(commit.transaction.balance_after, 30);
        assert_eq!(commit.transaction.delta, -20);
    }

    #[test]
    fn test_prepare_rejects_zero_delta() {
        assert!(matches!(
            PointsLedger::prepare(&account(0, 0), 0, PointsReason::AdminAdjustment, None, Utc::now()),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_conflict_rereads_balance() {
        let mut repo = MockAccountRepositoryTrait::new();
        let mut reads = 0;
        repo.expect_get_account().times(2).returning(move |_| {
            reads += 1;
            // 第二次读取看到并发写入后的余额
            Ok(Some(if reads == 1 { account(10, 0) } else { account(40, 1) }))
        });
        let mut commits = 0;
        repo.expect_commit_points().times(2).returning(move |c| {
            commits += 1;
            if commits == 1 {
                Err(LoyaltyError::StorageConflict)
            } else {
                assert_eq!(c.expected_version, 1);
                assert_eq!(c.new_balance, 45);
                Ok(())
            }
        });

        let result = ledger(repo, 3)
            .apply_transaction("u1", 5, PointsReason::AdminAdjustment, None)
            .await
            .unwrap();
        assert_eq!(result.new_balance, 45);
    }

    #[tokio::test]
    async fn test_persistent_conflict_surfaces_unavailable() {
        let mut repo = MockAccountRepositoryTrait::new();
        repo.expect_get_account()
            .returning(|_| Ok(Some(account(10, 0))));
        repo.expect_commit_points()
            .times(3)
            .returning(|_| Err(LoyaltyError::StorageConflict));

        let err = ledger(repo, 2)
            .apply_transaction("u1", 5, PointsReason::AdminAdjustment, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_insufficient_funds_never_commits() {
        let mut repo = MockAccountRepositoryTrait::new();
        repo.expect_get_account()
            .times(1)
            .returning(|_| Ok(Some(account(50, 2))));
        repo.expect_commit_points().never();

        let err = ledger(repo, 3)
            .apply_transaction("u1", -60, PointsReason::AdminAdjustment, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let mut repo = MockAccountRepositoryTrait::new();
        repo.expect_get_account().returning(|_| Ok(None));

        let err = ledger(repo, 0).get_balance("ghost").await.unwrap_err();
        assert!(matches!(err, LoyaltyError::AccountNotFound(_)));
    }
}
