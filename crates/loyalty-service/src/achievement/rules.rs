//! 成就规则表

use serde::Serialize;

use crate::models::CheckInStats;

/// 规则所依据的统计指标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatMetric {
    TotalCheckIns,
    UniqueVenues,
}

impl StatMetric {
    pub fn value(&self, stats: &CheckInStats) -> i64 {
        match self {
            Self::TotalCheckIns => stats.total_check_ins,
            Self::UniqueVenues => stats.unique_venues,
        }
    }
}

/// 单条成就规则：`metric >= threshold` 时解锁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRule {
    pub id: &'static str,
    pub name: &'static str,
    pub metric: StatMetric,
    pub threshold: i64,
}

impl AchievementRule {
    pub fn is_satisfied(&self, stats: &CheckInStats) -> bool {
        self.metric.value(stats) >= self.threshold
    }
}

/// 内置规则表
pub const DEFAULT_RULES: &[AchievementRule] = &[
    AchievementRule {
        id: "first_checkin",
        name: "初次到访",
        metric: StatMetric::TotalCheckIns,
        threshold: 1,
    },
    AchievementRule {
        id: "regular",
        name: "常客",
        metric: StatMetric::TotalCheckIns,
        threshold: 10,
    },
    AchievementRule {
        id: "taproom_legend",
        name: "酒馆传奇",
        metric: StatMetric::TotalCheckIns,
        threshold: 50,
    },
    AchievementRule {
        id: "explorer",
        name: "探索者",
        metric: StatMetric::UniqueVenues,
        threshold: 3,
    },
    AchievementRule {
        id: "globetrotter",
        name: "环游达人",
        metric: StatMetric::UniqueVenues,
        threshold: 10,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_ids_are_unique() {
        let ids: HashSet<_> = DEFAULT_RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), DEFAULT_RULES.len());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let explorer = DEFAULT_RULES
            .iter()
            .find(|r| r.id == "explorer")
            .unwrap();
        let two = CheckInStats {
            total_check_ins: 5,
            unique_venues: 2,
        };
        let three = CheckInStats {
            total_check_ins: 5,
            unique_venues: 3,
        };
        assert!(!explorer.is_satisfied(&two));
        assert!(explorer.is_satisfied(&three));
    }
}
