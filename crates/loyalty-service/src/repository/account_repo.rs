//! 用户账户与积分账本仓储（PostgreSQL）
//!
//! 余额写入以 `version` 为条件，流水与余额在同一事务中落库

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::traits::{AccountRepositoryTrait, PointsCommit};
use crate::error::{LoyaltyError, Result, unique_violation};
use crate::models::{PointsReason, PointsTransaction, UserAccount};

const CHECKIN_CREDIT_CONSTRAINT: &str = "uq_points_transactions_checkin";

pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中执行一次积分提交
    ///
    /// 供抽奖券购买复用，调用方负责提交事务
    pub(crate) async fn apply_points_in_tx(
        conn: &mut PgConnection,
        commit: &PointsCommit,
    ) -> Result<()> {
        let tx = &commit.transaction;
        let updated = sqlx::query(
            r#"
            UPDATE user_accounts
            SET point_balance = $1, version = version + 1, updated_at = $2
            WHERE user_id = $3 AND version = $4
            "#,
        )
        .bind(commit.new_balance)
        .bind(tx.created_at)
        .bind(&tx.user_id)
        .bind(commit.expected_version)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM user_accounts WHERE user_id = $1")
                    .bind(&tx.user_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match exists {
                Some(_) => LoyaltyError::StorageConflict,
                None => LoyaltyError::AccountNotFound(tx.user_id.clone()),
            });
        }

        Self::insert_transaction_in_tx(conn, tx).await
    }

    async fn insert_transaction_in_tx(
        conn: &mut PgConnection,
        tx: &PointsTransaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO points_transactions
                (id, user_id, delta, reason, related_entity_id, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tx.id)
        .bind(&tx.user_id)
        .bind(tx.delta)
        .bind(tx.reason)
        .bind(&tx.related_entity_id)
        .bind(tx.balance_after)
        .bind(tx.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(CHECKIN_CREDIT_CONSTRAINT) => LoyaltyError::DuplicateTransaction {
                reason: tx.reason.as_str().to_string(),
                related_entity_id: tx.related_entity_id.clone().unwrap_or_default(),
            },
            _ => LoyaltyError::from(e),
        })?;

        Ok(())
    }
}

#[async_trait]
impl AccountRepositoryTrait for PgAccountRepository {
    async fn create_account(&self, account: &UserAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_accounts (user_id, point_balance, version, achievements, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&account.user_id)
        .bind(account.point_balance)
        .bind(account.version)
        .bind(&account.achievements)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => LoyaltyError::AccountAlreadyExists(account.user_id.clone()),
            None => LoyaltyError::from(e),
        })?;

        Ok(())
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(
            r#"
            SELECT user_id, point_balance, version, achievements, created_at, updated_at
            FROM user_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn delete_account(&self, user_id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM user_accounts WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn list_account_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM user_accounts ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn commit_points(&self, commit: &PointsCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::apply_points_in_tx(&mut tx, commit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_transaction(
        &self,
        reason: PointsReason,
        related_entity_id: &str,
    ) -> Result<Option<PointsTransaction>> {
        let tx = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, user_id, delta, reason, related_entity_id, balance_after, created_at
            FROM points_transactions
            WHERE reason = $1 AND related_entity_id = $2
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(reason)
        .bind(related_entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tx)
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>> {
        let rows = sqlx::query_as::<_, PointsTransaction>(
            r#"
            SELECT id, user_id, delta, reason, related_entity_id, balance_after, created_at
            FROM points_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn sum_deltas(&self, user_id: &str) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM points_transactions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn add_achievements(
        &self,
        user_id: &str,
        achievements: &[String],
    ) -> Result<Vec<String>> {
        // 保留首次出现的顺序去重
        let merged: Option<Vec<String>> = sqlx::query_scalar(
            r#"
            UPDATE user_accounts
            SET achievements = (
                SELECT COALESCE(array_agg(a ORDER BY ord), '{}')
                FROM (
                    SELECT a, MIN(ord) AS ord
                    FROM unnest(achievements || $2::TEXT[]) WITH ORDINALITY AS t(a, ord)
                    GROUP BY a
                ) dedup
            ),
            updated_at = NOW()
            WHERE user_id = $1
            RETURNING achievements
            "#,
        )
        .bind(user_id)
        .bind(achievements)
        .fetch_optional(&self.pool)
        .await?;

        merged.ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))
    }
}
