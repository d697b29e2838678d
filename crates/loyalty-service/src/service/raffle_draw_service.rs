//! 开奖服务
//!
//! 抽奖状态只允许 active -> closed（开奖）或 active -> cancelled（取消）。
//! 开奖以 `status == active` 且 `total_entries` 未变化为条件写入，
//! 只有赢得状态迁移的那次开奖会产生中奖者。

use std::sync::Arc;

use chrono::Utc;
use taproom_shared::observability::metrics;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::draw::{EntropySource, WeightedTable};
use crate::error::{LoyaltyError, Result};
use crate::models::{Raffle, RaffleStatus};
use crate::notification::NotificationSender;
use crate::repository::{RaffleRepositoryTrait, RaffleTransition};

use super::dto::{DrawResult, NewRaffle};
use super::storage::StorageExecutor;

pub struct RaffleDrawService {
    raffles: Arc<dyn RaffleRepositoryTrait>,
    entropy: Arc<dyn EntropySource>,
    notifier: NotificationSender,
    executor: StorageExecutor,
}

impl RaffleDrawService {
    pub fn new(
        raffles: Arc<dyn RaffleRepositoryTrait>,
        entropy: Arc<dyn EntropySource>,
        notifier: NotificationSender,
        executor: StorageExecutor,
    ) -> Self {
        Self {
            raffles,
            entropy,
            notifier,
            executor,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_raffle(&self, new_raffle: NewRaffle) -> Result<Raffle> {
        let now = Utc::now();
        if new_raffle.prize_name.trim().is_empty() {
            return Err(LoyaltyError::Validation("奖品名称不能为空".to_string()));
        }
        if new_raffle.cost_per_entry <= 0 {
            return Err(LoyaltyError::Validation("每张抽奖券积分必须为正数".to_string()));
        }
        if new_raffle.max_entries_per_user <= 0 {
            return Err(LoyaltyError::Validation("每人限购数量必须为正数".to_string()));
        }
        if new_raffle.end_at <= now {
            return Err(LoyaltyError::Validation("截止时间必须晚于当前时间".to_string()));
        }

        let raffle = new_raffle.into_raffle(now);
        self.executor
            .timed("create_raffle", self.raffles.create_raffle(&raffle))
            .await?;
        info!(raffle_id = %raffle.id, prize = %raffle.prize_name, "抽奖已创建");
        Ok(raffle)
    }

    pub async fn get_raffle(&self, raffle_id: Uuid) -> Result<Raffle> {
        self.executor
            .timed("get_raffle", self.raffles.get_raffle(raffle_id))
            .await?
            .ok_or(LoyaltyError::RaffleNotFound(raffle_id))
    }

    /// 开奖
    ///
    /// 对已开奖的抽奖再次调用返回 `RaffleAlreadyClosed`，不会重新抽取
    #[instrument(skip(self))]
    pub async fn draw_winner(&self, raffle_id: Uuid) -> Result<DrawResult> {
        let draw_id = Uuid::now_v7();
        let result = self
            .executor
            .with_retry("draw_winner", || self.attempt_draw(raffle_id, draw_id))
            .await;

        let result = match result {
            Err(e @ LoyaltyError::StorageUnavailable(_)) => {
                self.confirm_draw(raffle_id, draw_id, e).await
            }
            other => other,
        };

        match &result {
            Ok(r) => {
                metrics::record_raffle_draw("closed");
                info!(
                    draw_id = %draw_id,
                    winner = %r.winner_user_id,
                    total_entries = r.total_entries,
                    ticket = ?r.winning_ticket,
                    "开奖完成"
                );
            }
            Err(LoyaltyError::NoEntries(_)) => metrics::record_raffle_draw("no_entries"),
            Err(e) if e.is_business_error() => {
                metrics::record_raffle_draw("rejected");
                info!(error = %e, "开奖被拒绝");
            }
            Err(e) => {
                metrics::record_raffle_draw("failed");
                warn!(draw_id = %draw_id, error = %e, "开奖失败");
            }
        }
        result
    }

    async fn attempt_draw(&self, raffle_id: Uuid, draw_id: Uuid) -> Result<DrawResult> {
        let raffle = self.get_raffle(raffle_id).await?;
        raffle.ensure_active()?;

        let entrants = self
            .executor
            .timed("list_entrants", self.raffles.list_entrants(raffle_id))
            .await?;
        let table = WeightedTable::new(&entrants);
        if table.is_empty() {
            return Err(LoyaltyError::NoEntries(raffle_id));
        }
        // 两次读取之间有新的购买，重新读取
        if table.total() != raffle.total_entries as u64 {
            return Err(LoyaltyError::StorageConflict);
        }

        let (ticket, winner) = table
            .draw(&*self.entropy)
            .ok_or(LoyaltyError::NoEntries(raffle_id))?;
        let winner = winner.to_string();

        let transition = RaffleTransition {
            raffle_id,
            to: RaffleStatus::Closed,
            expected_total_entries: Some(raffle.total_entries),
            winner_user_id: Some(winner.clone()),
            draw_id: Some(draw_id),
            at: Utc::now(),
        };
        let closed = self
            .executor
            .timed("transition_raffle", self.raffles.transition_raffle(&transition))
            .await?;

        self.notifier
            .send_raffle_won(&winner, raffle_id, &closed.prize_name);
        Ok(DrawResult {
            raffle_id,
            draw_id,
            winner_user_id: winner,
            total_entries: closed.total_entries,
            winning_ticket: Some(ticket),
        })
    }

    /// 结果未知时重新读取，仅当抽奖由本次开奖关闭时视为成功
    async fn confirm_draw(
        &self,
        raffle_id: Uuid,
        draw_id: Uuid,
        cause: LoyaltyError,
    ) -> Result<DrawResult> {
        let Ok(raffle) = self.get_raffle(raffle_id).await else {
            return Err(cause);
        };
        match (raffle.status, raffle.draw_id, raffle.winner_user_id) {
            (RaffleStatus::Closed, Some(id), Some(winner)) if id == draw_id => {
                info!(draw_id = %draw_id, "开奖结果已确认落库");
                self.notifier
                    .send_raffle_won(&winner, raffle_id, &raffle.prize_name);
                Ok(DrawResult {
                    raffle_id,
                    draw_id,
                    winner_user_id: winner,
                    total_entries: raffle.total_entries,
                    winning_ticket: None,
                })
            }
            _ => Err(cause),
        }
    }

    /// 取消抽奖，已购抽奖券的积分不退还
    #[instrument(skip(self))]
    pub async fn cancel_raffle(&self, raffle_id: Uuid) -> Result<Raffle> {
        let transition = RaffleTransition {
            raffle_id,
            to: RaffleStatus::Cancelled,
            expected_total_entries: None,
            winner_user_id: None,
            draw_id: None,
            at: Utc::now(),
        };
        let cancelled = self
            .executor
            .timed("transition_raffle", self.raffles.transition_raffle(&transition))
            .await?;

        metrics::record_raffle_draw("cancelled");
        info!(total_entries = cancelled.total_entries, "抽奖已取消");
        self.notifier
            .send_raffle_cancelled(raffle_id, &cancelled.prize_name);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::FixedFraction;
    use crate::models::EntrantSummary;
    use crate::repository::MockRaffleRepositoryTrait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use taproom_shared::retry::RetryPolicy;

    fn service(raffles: MockRaffleRepositoryTrait) -> RaffleDrawService {
        RaffleDrawService::new(
            Arc::new(raffles),
            Arc::new(FixedFraction(0.95)),
            NotificationSender::disabled(),
            StorageExecutor::new(RetryPolicy::from_millis(2, 0, 0), Duration::from_secs(1)),
        )
    }

    fn raffle_with_total(total: i64) -> Raffle {
        let now = Utc::now();
        Raffle {
            total_entries: total,
            ..Raffle::new("Keg", 10, 10, now + ChronoDuration::days(1), now)
        }
    }

    fn entrant(user: &str, entries: i64) -> EntrantSummary {
        EntrantSummary {
            user_id: user.to_string(),
            total_entries: entries,
            first_entry_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_no_entries() {
        let r = raffle_with_total(0);
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles
            .expect_get_raffle()
            .returning(move |_| Ok(Some(r.clone())));
        raffles.expect_list_entrants().returning(|_| Ok(vec![]));
        raffles.expect_transition_raffle().never();

        let err = service(raffles).draw_winner(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::NoEntries(_)));
    }

    #[tokio::test]
    async fn test_transition_carries_expected_total() {
        let r = raffle_with_total(10);
        let closed = Raffle {
            status: RaffleStatus::Closed,
            ..r.clone()
        };
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles
            .expect_get_raffle()
            .returning(move |_| Ok(Some(r.clone())));
        raffles
            .expect_list_entrants()
            .returning(|_| Ok(vec![entrant("a", 1), entrant("b", 9)]));
        raffles
            .expect_transition_raffle()
            .withf(|t| {
                t.to == RaffleStatus::Closed
                    && t.expected_total_entries == Some(10)
                    && t.winner_user_id.as_deref() == Some("b")
            })
            .times(1)
            .returning(move |_| Ok(closed.clone()));

        let result = service(raffles).draw_winner(Uuid::now_v7()).await.unwrap();
        assert_eq!(result.winner_user_id, "b");
        assert_eq!(result.winning_ticket, Some(9));
    }

    #[tokio::test]
    async fn test_stale_counter_retried() {
        // 第一次读取的计数落后于抽奖券，第二次一致
        let mut reads = 0;
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles.expect_get_raffle().times(2).returning(move |_| {
            reads += 1;
            Ok(Some(raffle_with_total(if reads == 1 { 8 } else { 10 })))
        });
        raffles
            .expect_list_entrants()
            .times(2)
            .returning(|_| Ok(vec![entrant("a", 1), entrant("b", 9)]));
        raffles
            .expect_transition_raffle()
            .times(1)
            .returning(|t| {
                Ok(Raffle {
                    status: RaffleStatus::Closed,
                    winner_user_id: t.winner_user_id.clone(),
                    ..raffle_with_total(10)
                })
            });

        let result = service(raffles).draw_winner(Uuid::now_v7()).await.unwrap();
        assert_eq!(result.total_entries, 10);
    }

    #[tokio::test]
    async fn test_unknown_outcome_confirmed_by_draw_id() {
        let template = raffle_with_total(10);
        let mut reads = 0;
        let mut raffles = MockRaffleRepositoryTrait::new();
        let confirmed = std::sync::Arc::new(parking_lot::Mutex::new(None::<Uuid>));
        let seen = confirmed.clone();
        raffles
            .expect_transition_raffle()
            .times(1)
            .returning(move |t| {
                *seen.lock() = t.draw_id;
                Err(LoyaltyError::StorageUnavailable("timeout".to_string()))
            });
        let observed = confirmed.clone();
        raffles.expect_get_raffle().returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(Some(template.clone()))
            } else {
                Ok(Some(Raffle {
                    status: RaffleStatus::Closed,
                    draw_id: *observed.lock(),
                    winner_user_id: Some("b".to_string()),
                    ..template.clone()
                }))
            }
        });
        raffles
            .expect_list_entrants()
            .returning(|_| Ok(vec![entrant("a", 1), entrant("b", 9)]));

        let result = service(raffles).draw_winner(Uuid::now_v7()).await.unwrap();
        assert_eq!(result.winner_user_id, "b");
        assert_eq!(result.winning_ticket, None);
    }

    #[tokio::test]
    async fn test_cancel_closed_raffle_rejected() {
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles
            .expect_transition_raffle()
            .returning(|t| Err(LoyaltyError::RaffleAlreadyClosed(t.raffle_id)));

        let err = service(raffles).cancel_raffle(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::RaffleAlreadyClosed(_)));
    }

    #[tokio::test]
    async fn test_create_raffle_validation() {
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles.expect_create_raffle().never();
        let svc = service(raffles);

        let past = NewRaffle {
            prize_name: "Keg".to_string(),
            cost_per_entry: 10,
            max_entries_per_user: 5,
            end_at: Utc::now() - ChronoDuration::minutes(1),
        };
        assert!(matches!(
            svc.create_raffle(past.clone()).await,
            Err(LoyaltyError::Validation(_))
        ));

        let free = NewRaffle {
            cost_per_entry: 0,
            end_at: Utc::now() + ChronoDuration::days(1),
            ..past
        };
        assert!(matches!(
            svc.create_raffle(free).await,
            Err(LoyaltyError::Validation(_))
        ));
    }
}
