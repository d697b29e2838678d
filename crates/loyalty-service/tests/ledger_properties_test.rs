//! 积分账本与签到集成测试
//!
//! 基于 MemoryStore 验证余额与流水始终一致、失败调用不留痕迹

mod common;

use std::sync::Arc;

use futures::future::join_all;
use loyalty::repository::AccountRepositoryTrait;
use loyalty::{CheckInMethod, LoyaltyError, OsEntropy, PointsReason};

use common::{VENUE_ID, VENUE_REWARD, funded_account, harness, new_raffle};

/// 同一用户的并发积分变动：最终余额等于全部已提交变动之和
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_sum_to_balance() {
    let h = harness(Arc::new(OsEntropy));
    funded_account(&h.api, "u-hot", 100).await;

    let deltas: Vec<i64> = (0..40).map(|i| if i % 3 == 0 { -7 } else { 5 }).collect();
    let tasks = deltas.iter().map(|&delta| {
        let api = h.api.clone();
        tokio::spawn(async move { (delta, api.adjust_points("u-hot", delta, None).await) })
    });

    let mut committed = 100;
    for joined in join_all(tasks).await {
        let (delta, result) = joined.unwrap();
        match result {
            Ok(_) => committed += delta,
            Err(LoyaltyError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let balance = h.api.get_balance("u-hot").await.unwrap();
    assert_eq!(balance, committed);
    assert_eq!(h.store.sum_deltas("u-hot").await.unwrap(), balance);
    assert!(balance >= 0);
}

/// 签到 50 分后购买 3 张 20 分的抽奖券失败，余额不变
#[tokio::test]
async fn test_check_in_then_unaffordable_purchase() {
    let h = harness(Arc::new(OsEntropy));
    h.api.create_account("alice").await.unwrap();

    let result = h
        .api
        .check_in("alice", VENUE_ID, CheckInMethod::Qr)
        .await
        .unwrap();
    assert_eq!(result.points_awarded, VENUE_REWARD);
    assert_eq!(result.new_balance, 50);
    assert_eq!(result.new_achievements, vec!["first_checkin"]);

    let raffle = h.api.create_raffle(new_raffle(20, 5)).await.unwrap();
    let err = h
        .api
        .purchase_raffle_entries("alice", raffle.id, 3, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::InsufficientFunds {
            required: 60,
            available: 50
        }
    ));

    assert_eq!(h.api.get_balance("alice").await.unwrap(), 50);
    let entries = h.api.get_user_entries(raffle.id, "alice").await.unwrap();
    assert_eq!(entries.total_entries, 0);
    assert!(entries.entries.is_empty());
    assert_eq!(h.api.get_raffle(raffle.id).await.unwrap().total_entries, 0);

    let ledger = h.api.list_transactions("alice", 10).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].reason, PointsReason::Checkin);
}

/// 同一自然日同一场馆的第二次签到被拒绝，不产生积分
#[tokio::test]
async fn test_same_day_check_in_rejected() {
    let h = harness(Arc::new(OsEntropy));
    h.api.create_account("bob").await.unwrap();

    h.api
        .check_in("bob", VENUE_ID, CheckInMethod::Geolocation)
        .await
        .unwrap();
    let err = h
        .api
        .check_in("bob", VENUE_ID, CheckInMethod::Qr)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::DuplicateCheckIn { .. }));
    assert_eq!(h.api.get_balance("bob").await.unwrap(), VENUE_REWARD);

    // 另一场馆不受影响
    let other = h
        .api
        .check_in("bob", "venue-harbor", CheckInMethod::Qr)
        .await
        .unwrap();
    assert_eq!(other.new_balance, VENUE_REWARD + 30);
    assert!(other.new_achievements.is_empty());
}

/// 并发签到同一场馆只有一次入账
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_check_ins_credit_once() {
    let h = harness(Arc::new(OsEntropy));
    h.api.create_account("carol").await.unwrap();

    let tasks = (0..8).map(|_| {
        let api = h.api.clone();
        tokio::spawn(async move { api.check_in("carol", VENUE_ID, CheckInMethod::Qr).await })
    });
    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(h.api.get_balance("carol").await.unwrap(), VENUE_REWARD);
}

#[tokio::test]
async fn test_unknown_account_and_venue() {
    let h = harness(Arc::new(OsEntropy));

    let err = h
        .api
        .check_in("ghost", VENUE_ID, CheckInMethod::Qr)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AccountNotFound(_)));

    h.api.create_account("dave").await.unwrap();
    let err = h
        .api
        .check_in("dave", "venue-missing", CheckInMethod::Qr)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::VenueNotFound(_)));
    assert_eq!(h.api.get_balance("dave").await.unwrap(), 0);
}

#[tokio::test]
async fn test_deleted_account_stops_accruing() {
    let h = harness(Arc::new(OsEntropy));
    funded_account(&h.api, "erin", 40).await;

    h.api.delete_account("erin").await.unwrap();
    assert!(matches!(
        h.api.get_balance("erin").await.unwrap_err(),
        LoyaltyError::AccountNotFound(_)
    ));
    assert!(matches!(
        h.api.delete_account("erin").await.unwrap_err(),
        LoyaltyError::AccountNotFound(_)
    ));
}
