//! 内存存储
//!
//! 单个互斥锁保护全部状态，每个提交在持锁期间完成全部校验与写入，
//! 因而与 PostgreSQL 事务具有相同的原子性。适用于测试和本地开发。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{
    AccountRepositoryTrait, CheckInRepositoryTrait, NewCheckIn, PointsCommit, PurchaseCommit,
    RaffleRepositoryTrait, RaffleTransition,
};
use crate::error::{LoyaltyError, Result};
use crate::models::{
    CheckIn, CheckInStats, EntrantSummary, PointsReason, PointsTransaction, Raffle, RaffleEntry,
    RaffleStatus, UserAccount, check_entry_limit,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, UserAccount>,
    transactions: Vec<PointsTransaction>,
    /// 已入账的签到 ID
    credited_check_ins: HashSet<String>,
    check_ins: Vec<CheckIn>,
    dedupe_keys: HashMap<String, Uuid>,
    raffles: HashMap<Uuid, Raffle>,
    entries: Vec<RaffleEntry>,
}

impl MemoryState {
    fn user_entry_count(&self, raffle_id: Uuid, user_id: &str) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.raffle_id == raffle_id && e.user_id == user_id)
            .map(|e| e.entries_count)
            .sum()
    }

    /// 校验 version 并返回可写的账户
    fn account_for_commit(&mut self, commit: &PointsCommit) -> Result<&mut UserAccount> {
        let user_id = commit.user_id();
        let account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;
        if account.version != commit.expected_version {
            return Err(LoyaltyError::StorageConflict);
        }
        Ok(account)
    }

    fn check_credit_unique(&self, tx: &PointsTransaction) -> Result<()> {
        if tx.reason == PointsReason::Checkin
            && let Some(related) = &tx.related_entity_id
            && self.credited_check_ins.contains(related)
        {
            return Err(LoyaltyError::DuplicateTransaction {
                reason: tx.reason.as_str().to_string(),
                related_entity_id: related.clone(),
            });
        }
        Ok(())
    }

    fn apply_points(&mut self, commit: &PointsCommit) -> Result<()> {
        self.check_credit_unique(&commit.transaction)?;
        let account = self.account_for_commit(commit)?;
        account.point_balance = commit.new_balance;
        account.version += 1;
        account.updated_at = commit.transaction.created_at;

        let tx = commit.transaction.clone();
        if tx.reason == PointsReason::Checkin
            && let Some(related) = &tx.related_entity_id
        {
            self.credited_check_ins.insert(related.clone());
        }
        self.transactions.push(tx);
        Ok(())
    }
}

/// 内存存储，同时实现账户、签到与抽奖三个仓储接口
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 按用户聚合抽奖券，按 (first_entry_at, user_id) 排序
fn aggregate_entrants<'a>(
    entries: impl IntoIterator<Item = &'a RaffleEntry>,
) -> Vec<EntrantSummary> {
    let mut by_user: HashMap<&str, EntrantSummary> = HashMap::new();
    for entry in entries {
        by_user
            .entry(entry.user_id.as_str())
            .and_modify(|s| {
                s.total_entries += entry.entries_count;
                if entry.created_at < s.first_entry_at {
                    s.first_entry_at = entry.created_at;
                }
            })
            .or_insert_with(|| EntrantSummary {
                user_id: entry.user_id.clone(),
                total_entries: entry.entries_count,
                first_entry_at: entry.created_at,
            });
    }

    let mut entrants: Vec<EntrantSummary> = by_user.into_values().collect();
    entrants.sort_by(|a, b| {
        a.first_entry_at
            .cmp(&b.first_entry_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    entrants
}

#[async_trait]
impl AccountRepositoryTrait for MemoryStore {
    async fn create_account(&self, account: &UserAccount) -> Result<()> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&account.user_id) {
            return Err(LoyaltyError::AccountAlreadyExists(account.user_id.clone()));
        }
        state
            .accounts
            .insert(account.user_id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>> {
        Ok(self.state.lock().accounts.get(user_id).cloned())
    }

    async fn delete_account(&self, user_id: &str) -> Result<bool> {
        Ok(self.state.lock().accounts.remove(user_id).is_some())
    }

    async fn list_account_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.state.lock().accounts.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn commit_points(&self, commit: &PointsCommit) -> Result<()> {
        self.state.lock().apply_points(commit)
    }

    async fn find_transaction(
        &self,
        reason: PointsReason,
        related_entity_id: &str,
    ) -> Result<Option<PointsTransaction>> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .find(|t| t.reason == reason && t.related_entity_id.as_deref() == Some(related_entity_id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsTransaction>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sum_deltas(&self, user_id: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.delta)
            .sum())
    }

    async fn add_achievements(
        &self,
        user_id: &str,
        achievements: &[String],
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;
        for id in achievements {
            if !account.has_achievement(id) {
                account.achievements.push(id.clone());
            }
        }
        Ok(account.achievements.clone())
    }
}

#[async_trait]
impl CheckInRepositoryTrait for MemoryStore {
    async fn insert_check_in(&self, new_check_in: &NewCheckIn) -> Result<()> {
        let mut state = self.state.lock();
        let check_in = &new_check_in.check_in;
        if let Some(key) = &new_check_in.dedupe_key {
            if state.dedupe_keys.contains_key(key) {
                return Err(LoyaltyError::DuplicateCheckIn {
                    user_id: check_in.user_id.clone(),
                    venue_id: check_in.venue_id.clone(),
                });
            }
            state.dedupe_keys.insert(key.clone(), check_in.id);
        }
        state.check_ins.push(check_in.clone());
        Ok(())
    }

    async fn get_check_in(&self, id: Uuid) -> Result<Option<CheckIn>> {
        Ok(self
            .state
            .lock()
            .check_ins
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn delete_uncredited_check_in(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock();
        if state.credited_check_ins.contains(&id.to_string()) {
            return Ok(false);
        }
        let before = state.check_ins.len();
        state.check_ins.retain(|c| c.id != id);
        state.dedupe_keys.retain(|_, v| *v != id);
        Ok(state.check_ins.len() != before)
    }

    async fn check_in_stats(&self, user_id: &str) -> Result<CheckInStats> {
        let state = self.state.lock();
        let mine: Vec<&CheckIn> = state
            .check_ins
            .iter()
            .filter(|c| c.user_id == user_id)
            .collect();
        let venues: HashSet<&str> = mine.iter().map(|c| c.venue_id.as_str()).collect();
        Ok(CheckInStats {
            total_check_ins: mine.len() as i64,
            unique_venues: venues.len() as i64,
        })
    }

    async fn list_check_ins(&self, user_id: &str, limit: i64) -> Result<Vec<CheckIn>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .check_ins
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_uncredited_check_ins(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CheckIn>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock();
        Ok(state
            .check_ins
            .iter()
            .filter(|c| {
                c.checked_in_at < before
                    && state.accounts.contains_key(&c.user_id)
                    && !state.credited_check_ins.contains(&c.id.to_string())
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RaffleRepositoryTrait for MemoryStore {
    async fn create_raffle(&self, raffle: &Raffle) -> Result<()> {
        self.state.lock().raffles.insert(raffle.id, raffle.clone());
        Ok(())
    }

    async fn get_raffle(&self, raffle_id: Uuid) -> Result<Option<Raffle>> {
        Ok(self.state.lock().raffles.get(&raffle_id).cloned())
    }

    async fn list_raffle_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.state.lock().raffles.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn transition_raffle(&self, transition: &RaffleTransition) -> Result<Raffle> {
        let mut state = self.state.lock();
        let raffle = state
            .raffles
            .get_mut(&transition.raffle_id)
            .ok_or(LoyaltyError::RaffleNotFound(transition.raffle_id))?;
        raffle.ensure_active()?;
        if let Some(expected) = transition.expected_total_entries
            && raffle.total_entries != expected
        {
            return Err(LoyaltyError::StorageConflict);
        }

        raffle.status = transition.to;
        raffle.winner_user_id = transition.winner_user_id.clone();
        raffle.draw_id = transition.draw_id;
        raffle.closed_at = Some(transition.at);
        Ok(raffle.clone())
    }

    async fn commit_purchase(&self, commit: &PurchaseCommit) -> Result<i64> {
        let mut state = self.state.lock();
        let entry = &commit.entry;

        if state.entries.iter().any(|e| e.id == entry.id) {
            return Err(LoyaltyError::DuplicateEntry(entry.id));
        }
        let raffle = state
            .raffles
            .get(&entry.raffle_id)
            .ok_or(LoyaltyError::RaffleNotFound(entry.raffle_id))?;
        raffle.ensure_open(commit.now)?;

        let current = state.user_entry_count(entry.raffle_id, &entry.user_id);
        if current != commit.expected_user_entries {
            return Err(LoyaltyError::StorageConflict);
        }
        check_entry_limit(current, entry.entries_count, commit.max_entries_per_user)?;

        // 账户写入失败时整个提交作废，此前尚未修改任何状态
        state.apply_points(&commit.points)?;
        state.entries.push(entry.clone());
        let raffle = state
            .raffles
            .get_mut(&entry.raffle_id)
            .ok_or(LoyaltyError::RaffleNotFound(entry.raffle_id))?;
        raffle.total_entries += entry.entries_count;
        Ok(raffle.total_entries)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<RaffleEntry>> {
        Ok(self
            .state
            .lock()
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned())
    }

    async fn user_entry_count(&self, raffle_id: Uuid, user_id: &str) -> Result<i64> {
        Ok(self.state.lock().user_entry_count(raffle_id, user_id))
    }

    async fn list_user_entries(&self, raffle_id: Uuid, user_id: &str) -> Result<Vec<RaffleEntry>> {
        Ok(self
            .state
            .lock()
            .entries
            .iter()
            .filter(|e| e.raffle_id == raffle_id && e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_entrants(&self, raffle_id: Uuid) -> Result<Vec<EntrantSummary>> {
        let state = self.state.lock();
        Ok(aggregate_entrants(
            state.entries.iter().filter(|e| e.raffle_id == raffle_id),
        ))
    }

    async fn sum_entries(&self, raffle_id: Uuid) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .entries
            .iter()
            .filter(|e| e.raffle_id == raffle_id)
            .map(|e| e.entries_count)
            .sum())
    }
}
