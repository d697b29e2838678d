//! 抽奖仓储（PostgreSQL）
//!
//! 购买抽奖券时锁定抽奖行，抽奖券写入、计数累加与积分扣减在同一事务内完成。
//! `total_entries` 不存在其他写入路径。

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::account_repo::PgAccountRepository;
use super::traits::{PurchaseCommit, RaffleRepositoryTrait, RaffleTransition};
use crate::error::{LoyaltyError, Result, unique_violation};
use crate::models::{EntrantSummary, Raffle, RaffleEntry, check_entry_limit};

const RAFFLE_COLUMNS: &str = "id, prize_name, cost_per_entry, max_entries_per_user, end_at, \
     status, total_entries, winner_user_id, draw_id, closed_at, created_at";

pub struct PgRaffleRepository {
    pool: PgPool,
}

impl PgRaffleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RaffleRepositoryTrait for PgRaffleRepository {
    async fn create_raffle(&self, raffle: &Raffle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raffles
                (id, prize_name, cost_per_entry, max_entries_per_user, end_at, status, total_entries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(raffle.id)
        .bind(&raffle.prize_name)
        .bind(raffle.cost_per_entry)
        .bind(raffle.max_entries_per_user)
        .bind(raffle.end_at)
        .bind(raffle.status)
        .bind(raffle.total_entries)
        .bind(raffle.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_raffle(&self, raffle_id: Uuid) -> Result<Option<Raffle>> {
        let sql = format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE id = $1");
        let raffle = sqlx::query_as::<_, Raffle>(&sql)
            .bind(raffle_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(raffle)
    }

    async fn list_raffle_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT id FROM raffles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn transition_raffle(&self, transition: &RaffleTransition) -> Result<Raffle> {
        let sql = format!(
            r#"
            UPDATE raffles
            SET status = $2, winner_user_id = $3, draw_id = $4, closed_at = $5
            WHERE id = $1
              AND status = 'active'
              AND ($6::BIGINT IS NULL OR total_entries = $6)
            RETURNING {RAFFLE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Raffle>(&sql)
            .bind(transition.raffle_id)
            .bind(transition.to)
            .bind(&transition.winner_user_id)
            .bind(transition.draw_id)
            .bind(transition.at)
            .bind(transition.expected_total_entries)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(raffle) = updated {
            return Ok(raffle);
        }

        // 条件未满足：区分不存在、已处于终态与计数已变化
        let current = self
            .get_raffle(transition.raffle_id)
            .await?
            .ok_or(LoyaltyError::RaffleNotFound(transition.raffle_id))?;
        current.ensure_active()?;
        Err(LoyaltyError::StorageConflict)
    }

    async fn commit_purchase(&self, commit: &PurchaseCommit) -> Result<i64> {
        let entry = &commit.entry;
        let mut tx = self.pool.begin().await?;

        let lock_sql = format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE id = $1 FOR UPDATE");
        let raffle = sqlx::query_as::<_, Raffle>(&lock_sql)
            .bind(entry.raffle_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LoyaltyError::RaffleNotFound(entry.raffle_id))?;
        raffle.ensure_open(commit.now)?;

        let current: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(entries_count), 0)::BIGINT
            FROM raffle_entries
            WHERE raffle_id = $1 AND user_id = $2
            "#,
        )
        .bind(entry.raffle_id)
        .bind(&entry.user_id)
        .fetch_one(&mut *tx)
        .await?;

        if current != commit.expected_user_entries {
            return Err(LoyaltyError::StorageConflict);
        }
        check_entry_limit(current, entry.entries_count, commit.max_entries_per_user)?;

        PgAccountRepository::apply_points_in_tx(&mut tx, &commit.points).await?;

        sqlx::query(
            r#"
            INSERT INTO raffle_entries (id, raffle_id, user_id, entries_count, points_spent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.raffle_id)
        .bind(&entry.user_id)
        .bind(entry.entries_count)
        .bind(entry.points_spent)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => LoyaltyError::DuplicateEntry(entry.id),
            None => LoyaltyError::from(e),
        })?;

        let total: i64 = sqlx::query_scalar(
            r#"
            UPDATE raffles SET total_entries = total_entries + $2
            WHERE id = $1
            RETURNING total_entries
            "#,
        )
        .bind(entry.raffle_id)
        .bind(entry.entries_count)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(total)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<RaffleEntry>> {
        let entry = sqlx::query_as::<_, RaffleEntry>(
            r#"
            SELECT id, raffle_id, user_id, entries_count, points_spent, created_at
            FROM raffle_entries
            WHERE id = $1
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn user_entry_count(&self, raffle_id: Uuid, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(entries_count), 0)::BIGINT
            FROM raffle_entries
            WHERE raffle_id = $1 AND user_id = $2
            "#,
        )
        .bind(raffle_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_user_entries(&self, raffle_id: Uuid, user_id: &str) -> Result<Vec<RaffleEntry>> {
        let rows = sqlx::query_as::<_, RaffleEntry>(
            r#"
            SELECT id, raffle_id, user_id, entries_count, points_spent, created_at
            FROM raffle_entries
            WHERE raffle_id = $1 AND user_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(raffle_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_entrants(&self, raffle_id: Uuid) -> Result<Vec<EntrantSummary>> {
        let rows = sqlx::query_as::<_, EntrantSummary>(
            r#"
            SELECT user_id,
                   SUM(entries_count)::BIGINT AS total_entries,
                   MIN(created_at) AS first_entry_at
            FROM raffle_entries
            WHERE raffle_id = $1
            GROUP BY user_id
            ORDER BY first_entry_at, user_id
            "#,
        )
        .bind(raffle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn sum_entries(&self, raffle_id: Uuid) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(entries_count), 0)::BIGINT FROM raffle_entries WHERE raffle_id = $1",
        )
        .bind(raffle_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}
