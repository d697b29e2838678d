//! 场馆目录
//!
//! 提供 venueId -> 签到奖励积分的查询，以及场馆存在性校验

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// 场馆
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub venue_id: String,
    pub name: String,
    /// 每次签到奖励的积分
    pub points_reward: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(venue_id: impl Into<String>, name: impl Into<String>, points_reward: i64) -> Self {
        Self {
            venue_id: venue_id.into(),
            name: name.into(),
            points_reward,
            enabled: true,
            created_at: Utc::now(),
        }
    }
}

/// 场馆目录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueDirectory: Send + Sync {
    /// 已停用的场馆视为不存在
    async fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>>;
    async fn upsert_venue(&self, venue: &Venue) -> Result<()>;
}

/// 内存场馆目录
#[derive(Debug, Default)]
pub struct StaticVenueDirectory {
    venues: DashMap<String, Venue>,
}

impl StaticVenueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_venues(venues: impl IntoIterator<Item = Venue>) -> Self {
        let directory = Self::new();
        for venue in venues {
            directory.venues.insert(venue.venue_id.clone(), venue);
        }
        directory
    }

    pub fn len(&self) -> usize {
        self.venues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }
}

#[async_trait]
impl VenueDirectory for StaticVenueDirectory {
    async fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
        Ok(self
            .venues
            .get(venue_id)
            .filter(|v| v.enabled)
            .map(|v| v.clone()))
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        self.venues.insert(venue.venue_id.clone(), venue.clone());
        Ok(())
    }
}

/// PostgreSQL 场馆目录（`venues` 表）
pub struct PgVenueDirectory {
    pool: PgPool,
}

impl PgVenueDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VenueDirectory for PgVenueDirectory {
    async fn get_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
        let venue = sqlx::query_as::<_, Venue>(
            r#"
            SELECT venue_id, name, points_reward, enabled, created_at
            FROM venues
            WHERE venue_id = $1 AND enabled
            "#,
        )
        .bind(venue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(venue)
    }

    async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO venues (venue_id, name, points_reward, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (venue_id) DO UPDATE
            SET name = EXCLUDED.name,
                points_reward = EXCLUDED.points_reward,
                enabled = EXCLUDED.enabled
            "#,
        )
        .bind(&venue.venue_id)
        .bind(&venue.name)
        .bind(venue.points_reward)
        .bind(venue.enabled)
        .bind(venue.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_lookup() {
        let directory = StaticVenueDirectory::with_venues([Venue::new("v1", "North Tap", 50)]);
        let venue = directory.get_venue("v1").await.unwrap().unwrap();
        assert_eq!(venue.points_reward, 50);
        assert!(directory.get_venue("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_venue_is_hidden() {
        let directory = StaticVenueDirectory::new();
        let mut venue = Venue::new("v1", "North Tap", 50);
        venue.enabled = false;
        directory.upsert_venue(&venue).await.unwrap();
        assert!(directory.get_venue("v1").await.unwrap().is_none());
        assert_eq!(directory.len(), 1);
    }
}
