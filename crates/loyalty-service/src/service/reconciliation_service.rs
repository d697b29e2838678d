//! 对账服务
//!
//! 从只追加的账本重新计算物化值并与之比对：
//! - `point_balance == sum(delta)`
//! - `total_entries == sum(entries_count)`
//!
//! 偏差只记录日志与指标，不自动改写。另外为未入账的签到补记积分，
//! 并按签到统计补齐缺失的成就。可随时重复运行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use taproom_shared::observability::metrics;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{LoyaltyError, Result};
use crate::repository::{AccountRepositoryTrait, CheckInRepositoryTrait, RaffleRepositoryTrait};

use super::check_in_service::CheckInService;
use super::storage::StorageExecutor;

const ORPHAN_BATCH_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDrift {
    pub user_id: String,
    pub point_balance: i64,
    pub ledger_sum: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDrift {
    pub raffle_id: Uuid,
    pub total_entries: i64,
    pub entry_sum: i64,
}

/// 一次对账的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts_checked: usize,
    pub raffles_checked: usize,
    /// 比对期间有并发写入而跳过的记录数
    pub skipped: usize,
    pub balance_drifts: Vec<BalanceDrift>,
    pub entry_drifts: Vec<EntryDrift>,
    pub orphan_check_ins_credited: usize,
    pub achievements_restored: usize,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.balance_drifts.is_empty() && self.entry_drifts.is_empty()
    }
}

pub struct ReconciliationService {
    accounts: Arc<dyn AccountRepositoryTrait>,
    check_ins: Arc<dyn CheckInRepositoryTrait>,
    raffles: Arc<dyn RaffleRepositoryTrait>,
    check_in_service: Arc<CheckInService>,
    executor: StorageExecutor,
    /// 仍可能处于正常入账流程中的签到不补记
    orphan_grace: Duration,
}

impl ReconciliationService {
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        check_ins: Arc<dyn CheckInRepositoryTrait>,
        raffles: Arc<dyn RaffleRepositoryTrait>,
        check_in_service: Arc<CheckInService>,
        executor: StorageExecutor,
        orphan_grace: Duration,
    ) -> Self {
        Self {
            accounts,
            check_ins,
            raffles,
            check_in_service,
            executor,
            orphan_grace,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ReconciliationReport> {
        let start = Instant::now();
        let mut report = ReconciliationReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            accounts_checked: 0,
            raffles_checked: 0,
            skipped: 0,
            balance_drifts: Vec::new(),
            entry_drifts: Vec::new(),
            orphan_check_ins_credited: 0,
            achievements_restored: 0,
        };

        // 先补记积分，再比对余额
        report.orphan_check_ins_credited = self
            .credit_orphan_check_ins(report.started_at)
            .await?;
        self.check_accounts(&mut report).await?;
        self.check_raffles(&mut report).await?;

        report.finished_at = Utc::now();
        metrics::record_operation_duration("reconciliation", start.elapsed().as_secs_f64());
        metrics::record_reconciliation_drift("balance", report.balance_drifts.len() as u64);
        metrics::record_reconciliation_drift("entries", report.entry_drifts.len() as u64);

        if report.is_consistent() {
            info!(
                accounts = report.accounts_checked,
                raffles = report.raffles_checked,
                credited = report.orphan_check_ins_credited,
                restored = report.achievements_restored,
                "对账完成，未发现偏差"
            );
        } else {
            error!(
                balance_drifts = report.balance_drifts.len(),
                entry_drifts = report.entry_drifts.len(),
                "对账发现物化值与账本不一致"
            );
        }
        Ok(report)
    }

    async fn credit_orphan_check_ins(&self, now: DateTime<Utc>) -> Result<usize> {
        let grace = chrono::Duration::from_std(self.orphan_grace)
            .map_err(|e| LoyaltyError::Internal(format!("对账宽限期无效: {e}")))?;
        let before = now
            .checked_sub_signed(grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let orphans = self
            .executor
            .timed(
                "list_uncredited_check_ins",
                self.check_ins
                    .list_uncredited_check_ins(before, ORPHAN_BATCH_SIZE),
            )
            .await?;

        let mut credited = 0;
        for check_in in &orphans {
            match self.check_in_service.credit(check_in).await {
                Ok(_) => {
                    credited += 1;
                    info!(check_in_id = %check_in.id, user_id = %check_in.user_id, "已补记签到积分");
                }
                Err(e) => warn!(check_in_id = %check_in.id, error = %e, "补记签到积分失败"),
            }
        }
        Ok(credited)
    }

    async fn check_accounts(&self, report: &mut ReconciliationReport) -> Result<()> {
        let user_ids = self
            .executor
            .timed("list_account_ids", self.accounts.list_account_ids())
            .await?;

        for user_id in user_ids {
            let Some(before) = self
                .executor
                .timed("get_account", self.accounts.get_account(&user_id))
                .await?
            else {
                continue;
            };
            let ledger_sum = self
                .executor
                .timed("sum_deltas", self.accounts.sum_deltas(&user_id))
                .await?;
            let after = self
                .executor
                .timed("get_account", self.accounts.get_account(&user_id))
                .await?;
            report.accounts_checked += 1;

            match after {
                Some(after) if after.version == before.version => {
                    if after.point_balance != ledger_sum {
                        warn!(
                            user_id = %user_id,
                            point_balance = after.point_balance,
                            ledger_sum,
                            "积分余额与流水不一致"
                        );
                        report.balance_drifts.push(BalanceDrift {
                            user_id: user_id.clone(),
                            point_balance: after.point_balance,
                            ledger_sum,
                        });
                    }
                }
                _ => report.skipped += 1,
            }

            match self.check_in_service.refresh_achievements(&user_id).await {
                Ok(restored) => {
                    if !restored.is_empty() {
                        info!(user_id = %user_id, achievements = ?restored, "已补齐成就");
                    }
                    report.achievements_restored += restored.len();
                }
                Err(LoyaltyError::AccountNotFound(_)) => {}
                Err(e) => warn!(user_id = %user_id, error = %e, "成就补齐失败"),
            }
        }
        Ok(())
    }

    async fn check_raffles(&self, report: &mut ReconciliationReport) -> Result<()> {
        let raffle_ids = self
            .executor
            .timed("list_raffle_ids", self.raffles.list_raffle_ids())
            .await?;

        for raffle_id in raffle_ids {
            let Some(before) = self
                .executor
                .timed("get_raffle", self.raffles.get_raffle(raffle_id))
                .await?
            else {
                continue;
            };
            let entry_sum = self
                .executor
                .timed("sum_entries", self.raffles.sum_entries(raffle_id))
                .await?;
            let after = self
                .executor
                .timed("get_raffle", self.raffles.get_raffle(raffle_id))
                .await?;
            report.raffles_checked += 1;

            match after {
                Some(after) if after.total_entries == before.total_entries => {
                    if after.total_entries != entry_sum {
                        warn!(
                            raffle_id = %raffle_id,
                            total_entries = after.total_entries,
                            entry_sum,
                            "抽奖计数与抽奖券记录不一致"
                        );
                        report.entry_drifts.push(EntryDrift {
                            raffle_id,
                            total_entries: after.total_entries,
                            entry_sum,
                        });
                    }
                }
                _ => report.skipped += 1,
            }
        }
        Ok(())
    }
}

/// 周期性对账任务
pub struct ReconciliationWorker {
    service: Arc<ReconciliationService>,
    interval: Duration,
}

impl ReconciliationWorker {
    pub fn new(service: Arc<ReconciliationService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// 主循环：持续运行直到进程退出
    pub async fn run(&self) {
        info!(interval = ?self.interval, "ReconciliationWorker 已启动");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.service.run().await {
                error!(error = %e, "对账任务出错");
            }
            metrics::set_worker_last_run("reconciliation_worker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievement::AchievementEngine;
    use crate::models::{CheckInStats, Raffle, UserAccount};
    use crate::notification::NotificationSender;
    use crate::repository::{
        MockAccountRepositoryTrait, MockCheckInRepositoryTrait, MockRaffleRepositoryTrait,
    };
    use crate::service::PointsLedger;
    use crate::settings::CheckInPolicy;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_drift_reported_not_repaired() {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts
            .expect_list_account_ids()
            .returning(|| Ok(vec!["u1".to_string()]));
        accounts.expect_get_account().returning(|_| {
            Ok(Some(UserAccount {
                point_balance: 100,
                version: 4,
                ..UserAccount::new("u1", Utc::now())
            }))
        });
        accounts.expect_sum_deltas().returning(|_| Ok(90));
        accounts.expect_commit_points().never();

        let mut check_ins = MockCheckInRepositoryTrait::new();
        let grace = Duration::from_secs(120);
        let started = Utc::now();
        check_ins
            .expect_list_uncredited_check_ins()
            .withf(move |before, _| {
                let cutoff = started - ChronoDuration::seconds(120);
                *before >= cutoff && *before < cutoff + ChronoDuration::seconds(30)
            })
            .times(1)
            .returning(|_, _| Ok(vec![]));
        check_ins
            .expect_check_in_stats()
            .returning(|_| Ok(CheckInStats::default()));

        let now = Utc::now();
        let raffle = Raffle {
            total_entries: 5,
            ..Raffle::new("Keg", 10, 5, now + ChronoDuration::days(1), now)
        };
        let raffle_id = raffle.id;
        let mut raffles = MockRaffleRepositoryTrait::new();
        raffles
            .expect_list_raffle_ids()
            .returning(move || Ok(vec![raffle_id]));
        raffles
            .expect_get_raffle()
            .returning(move |_| Ok(Some(raffle.clone())));
        raffles.expect_sum_entries().returning(|_| Ok(5));

        let accounts: Arc<dyn AccountRepositoryTrait> = Arc::new(accounts);
        let check_ins: Arc<dyn CheckInRepositoryTrait> = Arc::new(check_ins);
        let executor = StorageExecutor::default();
        let ledger = Arc::new(PointsLedger::new(accounts.clone(), executor.clone()));
        let check_in_service = Arc::new(CheckInService::new(
            accounts.clone(),
            check_ins.clone(),
            ledger,
            AchievementEngine::default(),
            NotificationSender::disabled(),
            CheckInPolicy::default(),
            executor.clone(),
        ));
        let service = ReconciliationService::new(
            accounts,
            check_ins,
            Arc::new(raffles),
            check_in_service,
            executor,
            grace,
        );

        let report = service.run().await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(
            report.balance_drifts,
            vec![BalanceDrift {
                user_id: "u1".to_string(),
                point_balance: 100,
                ledger_sum: 90,
            }]
        );
        assert!(report.entry_drifts.is_empty());
        assert_eq!(report.accounts_checked, 1);
        assert_eq!(report.raffles_checked, 1);
    }
}
