//! 集成测试公共辅助函数
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use loyalty::dto::NewRaffle;
use loyalty::{
    EntropySource, LoyaltyApi, LoyaltySettings, LoyaltyStores, MemoryStore, NotificationSender,
    StaticVenueDirectory, Venue,
};
use taproom_shared::retry::RetryPolicy;

pub const VENUE_ID: &str = "venue-north-tap";
pub const VENUE_REWARD: i64 = 50;

pub struct Harness {
    pub api: Arc<LoyaltyApi>,
    pub store: Arc<MemoryStore>,
}

/// 高并发场景下放宽重试次数，避免冲突耗尽
pub fn contention_settings() -> LoyaltySettings {
    LoyaltySettings {
        retry: RetryPolicy::from_millis(200, 1, 4),
        ..LoyaltySettings::default()
    }
}

pub fn harness_with(entropy: Arc<dyn EntropySource>, settings: LoyaltySettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let venues = StaticVenueDirectory::with_venues([
        Venue::new(VENUE_ID, "North Tap", VENUE_REWARD),
        Venue::new("venue-harbor", "Harbor Cellar", 30),
    ]);
    let api = LoyaltyApi::new(
        LoyaltyStores::memory(store.clone()),
        Arc::new(venues),
        &settings,
        entropy,
        NotificationSender::disabled(),
    );
    Harness {
        api: Arc::new(api),
        store,
    }
}

pub fn harness(entropy: Arc<dyn EntropySource>) -> Harness {
    harness_with(entropy, contention_settings())
}

/// 创建账户并充值
pub async fn funded_account(api: &LoyaltyApi, user_id: &str, points: i64) {
    api.create_account(user_id).await.unwrap();
    if points > 0 {
        api.adjust_points(user_id, points, Some("test funding"))
            .await
            .unwrap();
    }
}

pub fn new_raffle(cost_per_entry: i64, max_entries_per_user: i64) -> NewRaffle {
    NewRaffle {
        prize_name: "Barrel-aged stout crate".to_string(),
        cost_per_entry,
        max_entries_per_user,
        end_at: Utc::now() + Duration::hours(2),
    }
}
