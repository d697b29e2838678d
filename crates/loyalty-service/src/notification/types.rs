//! 通知数据结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 需要通知用户或运营的业务事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    #[serde(rename_all = "camelCase")]
    PointsCredited {
        user_id: String,
        delta: i64,
        new_balance: i64,
    },
    #[serde(rename_all = "camelCase")]
    AchievementUnlocked {
        user_id: String,
        achievement_id: String,
    },
    #[serde(rename_all = "camelCase")]
    EntriesPurchased {
        user_id: String,
        raffle_id: Uuid,
        entries_count: i64,
        total_entries: i64,
    },
    #[serde(rename_all = "camelCase")]
    RaffleWon {
        user_id: String,
        raffle_id: Uuid,
        prize_name: String,
    },
    #[serde(rename_all = "camelCase")]
    RaffleCancelled { raffle_id: Uuid, prize_name: String },
}

impl LoyaltyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PointsCredited { .. } => "points_credited",
            Self::AchievementUnlocked { .. } => "achievement_unlocked",
            Self::EntriesPurchased { .. } => "entries_purchased",
            Self::RaffleWon { .. } => "raffle_won",
            Self::RaffleCancelled { .. } => "raffle_cancelled",
        }
    }

    /// 接收人；抽奖取消为运营事件，没有单一接收人
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::PointsCredited { user_id, .. }
            | Self::AchievementUnlocked { user_id, .. }
            | Self::EntriesPurchased { user_id, .. }
            | Self::RaffleWon { user_id, .. } => Some(user_id.as_str()),
            Self::RaffleCancelled { .. } => None,
        }
    }
}

/// 待投递的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: Uuid,
    pub event: LoyaltyEvent,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: LoyaltyEvent) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            event,
            created_at: Utc::now(),
        }
    }
}
