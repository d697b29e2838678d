//! 对外服务接口
//!
//! 组合各服务，向 UI / 管理端提供按请求同步调用的操作

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::achievement::AchievementEngine;
use crate::draw::EntropySource;
use crate::error::{LoyaltyError, Result};
use crate::models::{
    CheckIn, CheckInMethod, EntrantSummary, PointsReason, PointsTransaction, Raffle, UserAccount,
};
use crate::notification::NotificationSender;
use crate::repository::{
    AccountRepositoryTrait, CheckInRepositoryTrait, MemoryStore, PgAccountRepository,
    PgCheckInRepository, PgRaffleRepository, RaffleRepositoryTrait,
};
use crate::settings::LoyaltySettings;
use crate::venue::{Venue, VenueDirectory};

use super::check_in_service::CheckInService;
use super::dto::{CheckInResult, DrawResult, NewRaffle, PurchaseResult, TransactionResult, UserEntries};
use super::points_ledger::PointsLedger;
use super::raffle_draw_service::RaffleDrawService;
use super::raffle_entry_service::RaffleEntryLedger;
use super::reconciliation_service::{ReconciliationReport, ReconciliationService};
use super::storage::StorageExecutor;

/// 三个仓储接口的一组实现
#[derive(Clone)]
pub struct LoyaltyStores {
    pub accounts: Arc<dyn AccountRepositoryTrait>,
    pub check_ins: Arc<dyn CheckInRepositoryTrait>,
    pub raffles: Arc<dyn RaffleRepositoryTrait>,
}

impl LoyaltyStores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            check_ins: store.clone(),
            raffles: store,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            check_ins: Arc::new(PgCheckInRepository::new(pool.clone())),
            raffles: Arc::new(PgRaffleRepository::new(pool)),
        }
    }
}

pub struct LoyaltyApi {
    venues: Arc<dyn VenueDirectory>,
    ledger: Arc<PointsLedger>,
    check_in_service: Arc<CheckInService>,
    entry_ledger: Arc<RaffleEntryLedger>,
    draw_service: Arc<RaffleDrawService>,
    reconciliation: Arc<ReconciliationService>,
    executor: StorageExecutor,
}

impl LoyaltyApi {
    pub fn new(
        stores: LoyaltyStores,
        venues: Arc<dyn VenueDirectory>,
        settings: &LoyaltySettings,
        entropy: Arc<dyn EntropySource>,
        notifier: NotificationSender,
    ) -> Self {
        let executor = StorageExecutor::new(settings.retry.clone(), settings.storage_timeout);
        let ledger = Arc::new(PointsLedger::new(stores.accounts.clone(), executor.clone()));
        let check_in_service = Arc::new(CheckInService::new(
            stores.accounts.clone(),
            stores.check_ins.clone(),
            ledger.clone(),
            AchievementEngine::default(),
            notifier.clone(),
            settings.check_in,
            executor.clone(),
        ));
        let entry_ledger = Arc::new(RaffleEntryLedger::new(
            stores.accounts.clone(),
            stores.raffles.clone(),
            notifier.clone(),
            executor.clone(),
        ));
        let draw_service = Arc::new(RaffleDrawService::new(
            stores.raffles.clone(),
            entropy,
            notifier,
            executor.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            stores.accounts,
            stores.check_ins,
            stores.raffles,
            check_in_service.clone(),
            executor.clone(),
            settings.orphan_grace,
        ));

        Self {
            venues,
            ledger,
            check_in_service,
            entry_ledger,
            draw_service,
            reconciliation,
            executor,
        }
    }

    pub fn reconciliation(&self) -> Arc<ReconciliationService> {
        self.reconciliation.clone()
    }

    // ==================== 签到与积分 ====================

    /// 查询场馆奖励后执行签到
    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        user_id: &str,
        venue_id: &str,
        method: CheckInMethod,
    ) -> Result<CheckInResult> {
        let venue = self
            .executor
            .timed("get_venue", self.venues.get_venue(venue_id))
            .await?
            .ok_or_else(|| LoyaltyError::VenueNotFound(venue_id.to_string()))?;
        self.check_in_service
            .check_in(user_id, venue_id, method, venue.points_reward)
            .await
    }

    pub async fn list_check_ins(&self, user_id: &str, limit: i64) -> Result<Vec<CheckIn>> {
        self.check_in_service.list_check_ins(user_id, limit).await
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<i64> {
        self.ledger.get_balance(user_id).await
    }

    pub async fn get_account(&self, user_id: &str) -> Result<UserAccount> {
        self.ledger.get_account(user_id).await
    }

    pub async fn create_account(&self, user_id: &str) -> Result<UserAccount> {
        self.ledger.create_account(user_id).await
    }

    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        self.ledger.delete_account(user_id).await
    }

    /// 运营调整积分，扣减同样受余额约束
    #[instrument(skip(self))]
    pub async fn adjust_points(
        &self,
        user_id: &str,
        delta: i64,
        note: Option<&str>,
    ) -> Result<TransactionResult> {
        let result = self
            .ledger
            .apply_transaction(user_id, delta, PointsReason::AdminAdjustment, None)
            .await?;
        info!(user_id, delta, note = note.unwrap_or(""), "运营积分调整");
        Ok(result)
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>> {
        self.ledger.list_transactions(user_id, limit).await
    }

    pub async fn upsert_venue(&self, venue: &Venue) -> Result<()> {
        if venue.points_reward <= 0 {
            return Err(LoyaltyError::Validation("场馆奖励积分必须为正数".to_string()));
        }
        self.executor
            .timed("upsert_venue", self.venues.upsert_venue(venue))
            .await
    }

    // ==================== 抽奖 ====================

    pub async fn create_raffle(&self, new_raffle: NewRaffle) -> Result<Raffle> {
        self.draw_service.create_raffle(new_raffle).await
    }

    pub async fn get_raffle(&self, raffle_id: Uuid) -> Result<Raffle> {
        self.draw_service.get_raffle(raffle_id).await
    }

    pub async fn purchase_raffle_entries(
        &self,
        user_id: &str,
        raffle_id: Uuid,
        entries_count: i64,
        idempotency_key: Option<&str>,
    ) -> Result<PurchaseResult> {
        self.entry_ledger
            .purchase_entries(user_id, raffle_id, entries_count, idempotency_key)
            .await
    }

    pub async fn get_raffle_entrants(&self, raffle_id: Uuid) -> Result<Vec<EntrantSummary>> {
        self.entry_ledger.get_entrants(raffle_id).await
    }

    pub async fn get_user_entries(&self, raffle_id: Uuid, user_id: &str) -> Result<UserEntries> {
        self.entry_ledger.get_user_entries(raffle_id, user_id).await
    }

    pub async fn draw_raffle_winner(&self, raffle_id: Uuid) -> Result<DrawResult> {
        self.draw_service.draw_winner(raffle_id).await
    }

    pub async fn cancel_raffle(&self, raffle_id: Uuid) -> Result<()> {
        self.draw_service.cancel_raffle(raffle_id).await.map(|_| ())
    }

    // ==================== 对账 ====================

    pub async fn run_reconciliation(&self) -> Result<ReconciliationReport> {
        self.reconciliation.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::FixedFraction;
    use crate::venue::MockVenueDirectory;

    fn api(venues: MockVenueDirectory) -> LoyaltyApi {
        LoyaltyApi::new(
            LoyaltyStores::memory(Arc::new(MemoryStore::new())),
            Arc::new(venues),
            &LoyaltySettings::default(),
            Arc::new(FixedFraction(0.5)),
            NotificationSender::disabled(),
        )
    }

    #[tokio::test]
    async fn test_unknown_venue_rejected() {
        let mut venues = MockVenueDirectory::new();
        venues.expect_get_venue().returning(|_| Ok(None));
        let api = api(venues);
        api.create_account("u1").await.unwrap();

        let err = api
            .check_in("u1", "nowhere", CheckInMethod::Qr)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::VenueNotFound(_)));
        assert_eq!(api.get_balance("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_venue_reward_is_credited() {
        let mut venues = MockVenueDirectory::new();
        venues
            .expect_get_venue()
            .withf(|id| id == "v1")
            .returning(|_| Ok(Some(Venue::new("v1", "North Tap", 35))));
        let api = api(venues);
        api.create_account("u1").await.unwrap();

        let result = api.check_in("u1", "v1", CheckInMethod::Qr).await.unwrap();
        assert_eq!(result.points_awarded, 35);
        assert_eq!(api.get_balance("u1").await.unwrap(), 35);
    }

    #[tokio::test]
    async fn test_negative_adjustment_obeys_balance() {
        let api = api(MockVenueDirectory::new());
        api.create_account("u1").await.unwrap();
        api.adjust_points("u1", 30, Some("welcome")).await.unwrap();

        let err = api.adjust_points("u1", -31, None).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::InsufficientFunds { .. }));
        assert_eq!(api.get_balance("u1").await.unwrap(), 30);
    }
}
