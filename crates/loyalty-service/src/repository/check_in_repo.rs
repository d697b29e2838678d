//! 签到仓储（PostgreSQL）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::{CheckInRepositoryTrait, NewCheckIn};
use crate::error::{LoyaltyError, Result, unique_violation};
use crate::models::{CheckIn, CheckInStats};

const DEDUPE_CONSTRAINT: &str = "uq_check_ins_dedupe_key";

pub struct PgCheckInRepository {
    pool: PgPool,
}

impl PgCheckInRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckInRepositoryTrait for PgCheckInRepository {
    async fn insert_check_in(&self, new_check_in: &NewCheckIn) -> Result<()> {
        let c = &new_check_in.check_in;
        sqlx::query(
            r#"
            INSERT INTO check_ins (id, user_id, venue_id, points_awarded, method, checked_in_at, dedupe_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(c.id)
        .bind(&c.user_id)
        .bind(&c.venue_id)
        .bind(c.points_awarded)
        .bind(c.method)
        .bind(c.checked_in_at)
        .bind(&new_check_in.dedupe_key)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(DEDUPE_CONSTRAINT) => LoyaltyError::DuplicateCheckIn {
                user_id: c.user_id.clone(),
                venue_id: c.venue_id.clone(),
            },
            _ => LoyaltyError::from(e),
        })?;

        Ok(())
    }

    async fn get_check_in(&self, id: Uuid) -> Result<Option<CheckIn>> {
        let check_in = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT id, user_id, venue_id, points_awarded, method, checked_in_at
            FROM check_ins
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(check_in)
    }

    async fn delete_uncredited_check_in(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM check_ins c
            WHERE c.id = $1
              AND NOT EXISTS (
                SELECT 1 FROM points_transactions t
                WHERE t.reason = 'checkin' AND t.related_entity_id = c.id::TEXT
              )
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    async fn check_in_stats(&self, user_id: &str) -> Result<CheckInStats> {
        let (total_check_ins, unique_venues): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*)::BIGINT, COUNT(DISTINCT venue_id)::BIGINT
            FROM check_ins
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CheckInStats {
            total_check_ins,
            unique_venues,
        })
    }

    async fn list_check_ins(&self, user_id: &str, limit: i64) -> Result<Vec<CheckIn>> {
        let rows = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT id, user_id, venue_id, points_awarded, method, checked_in_at
            FROM check_ins
            WHERE user_id = $1
            ORDER BY checked_in_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_uncredited_check_ins(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CheckIn>> {
        let rows = sqlx::query_as::<_, CheckIn>(
            r#"
            SELECT c.id, c.user_id, c.venue_id, c.points_awarded, c.method, c.checked_in_at
            FROM check_ins c
            JOIN user_accounts a ON a.user_id = c.user_id
            WHERE c.checked_in_at < $1
              AND NOT EXISTS (
                SELECT 1 FROM points_transactions t
                WHERE t.reason = 'checkin' AND t.related_entity_id = c.id::TEXT
            )
            ORDER BY c.checked_in_at
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
