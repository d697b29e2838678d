//! 成就评估

use tracing::debug;

use super::rules::{AchievementRule, DEFAULT_RULES};
use crate::models::CheckInStats;

/// 评估输入：签到统计与已解锁集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub stats: CheckInStats,
    pub unlocked: Vec<String>,
}

/// 无状态成就引擎
#[derive(Debug, Clone)]
pub struct AchievementEngine {
    rules: Vec<AchievementRule>,
}

impl Default for AchievementEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl AchievementEngine {
    pub fn new(rules: Vec<AchievementRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AchievementRule] {
        &self.rules
    }

    /// 返回满足条件且尚未解锁的成就 ID，按规则表顺序
    ///
    /// 纯函数：同一快照在并集持久化后再次评估结果为空
    pub fn evaluate(&self, user_id: &str, snapshot: &StatsSnapshot) -> Vec<String> {
        let unlocked: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.is_satisfied(&snapshot.stats))
            .filter(|rule| !snapshot.unlocked.iter().any(|id| id == rule.id))
            .map(|rule| rule.id.to_string())
            .collect();

        if !unlocked.is_empty() {
            debug!(user_id, achievements = ?unlocked, "满足新的成就条件");
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: i64, venues: i64, unlocked: &[&str]) -> StatsSnapshot {
        StatsSnapshot {
            stats: CheckInStats {
                total_check_ins: total,
                unique_venues: venues,
            },
            unlocked: unlocked.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_no_check_ins_unlocks_nothing() {
        let engine = AchievementEngine::default();
        assert!(engine.evaluate("u1", &snapshot(0, 0, &[])).is_empty());
    }

    #[test]
    fn test_first_check_in() {
        let engine = AchievementEngine::default();
        assert_eq!(
            engine.evaluate("u1", &snapshot(1, 1, &[])),
            vec!["first_checkin"]
        );
    }

    #[test]
    fn test_already_unlocked_is_skipped() {
        let engine = AchievementEngine::default();
        let first = snapshot(12, 4, &[]);
        let unlocked = engine.evaluate("u1", &first);
        assert_eq!(unlocked, vec!["first_checkin", "regular", "explorer"]);

        let persisted = StatsSnapshot {
            unlocked,
            ..first
        };
        assert!(engine.evaluate("u1", &persisted).is_empty());
    }

    #[test]
    fn test_custom_rule_table() {
        let engine = AchievementEngine::new(vec![AchievementRule {
            id: "pair",
            name: "pair",
            metric: crate::achievement::StatMetric::TotalCheckIns,
            threshold: 2,
        }]);
        assert!(engine.evaluate("u1", &snapshot(1, 1, &[])).is_empty());
        assert_eq!(engine.evaluate("u1", &snapshot(2, 1, &[])), vec!["pair"]);
    }
}
