//! 累计权重表

use crate::models::EntrantSummary;

use super::entropy::EntropySource;

/// 按参与者顺序构建的累计权重表
///
/// `cumulative[i]` 为前 i+1 位参与者的券数之和，券号 t 归属于
/// 第一个满足 `cumulative[i] > t` 的参与者。
#[derive(Debug, Clone, Default)]
pub struct WeightedTable {
    user_ids: Vec<String>,
    cumulative: Vec<u64>,
}

impl WeightedTable {
    /// 忽略券数不为正的参与者
    pub fn new(entrants: &[EntrantSummary]) -> Self {
        let mut table = Self::default();
        let mut running: u64 = 0;
        for entrant in entrants {
            let Ok(weight) = u64::try_from(entrant.total_entries) else {
                continue;
            };
            if weight == 0 {
                continue;
            }
            running += weight;
            table.user_ids.push(entrant.user_id.clone());
            table.cumulative.push(running);
        }
        table
    }

    pub fn total(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// 券号所属用户，越界返回 None
    pub fn owner_of(&self, ticket: u64) -> Option<&str> {
        let idx = self.cumulative.partition_point(|&c| c <= ticket);
        self.user_ids.get(idx).map(String::as_str)
    }

    /// 从随机源抽取一张券并返回 (券号, 中奖用户)
    pub fn draw(&self, entropy: &dyn EntropySource) -> Option<(u64, &str)> {
        if self.is_empty() {
            return None;
        }
        let ticket = entropy.pick_ticket(self.total());
        self.owner_of(ticket).map(|user| (ticket, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::FixedFraction;
    use chrono::Utc;

    fn entrant(user: &str, entries: i64) -> EntrantSummary {
        EntrantSummary {
            user_id: user.to_string(),
            total_entries: entries,
            first_entry_at: Utc::now(),
        }
    }

    #[test]
    fn test_ticket_ownership_boundaries() {
        let table = WeightedTable::new(&[entrant("a", 1), entrant("b", 9)]);
        assert_eq!(table.total(), 10);
        assert_eq!(table.owner_of(0), Some("a"));
        assert_eq!(table.owner_of(1), Some("b"));
        assert_eq!(table.owner_of(9), Some("b"));
        assert_eq!(table.owner_of(10), None);
    }

    #[test]
    fn test_fixed_fraction_selects_heavy_entrant() {
        let table = WeightedTable::new(&[entrant("a", 1), entrant("b", 9)]);
        assert_eq!(table.draw(&FixedFraction(0.95)), Some((9, "b")));
        assert_eq!(table.draw(&FixedFraction(0.05)), Some((0, "a")));
    }

    #[test]
    fn test_zero_weight_entrants_skipped() {
        let table = WeightedTable::new(&[entrant("a", 0), entrant("b", 2), entrant("c", -1)]);
        assert_eq!(table.total(), 2);
        assert_eq!(table.owner_of(0), Some("b"));
        assert_eq!(table.owner_of(1), Some("b"));
    }

    #[test]
    fn test_empty_table_draws_nothing() {
        let table = WeightedTable::new(&[]);
        assert!(table.is_empty());
        assert_eq!(table.draw(&FixedFraction(0.5)), None);
    }
}
