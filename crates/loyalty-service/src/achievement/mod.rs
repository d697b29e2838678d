//! 成就引擎
//!
//! 对签到统计快照做纯函数评估，返回尚未解锁的成就，持久化由调用方负责

mod engine;
mod rules;

pub use engine::{AchievementEngine, StatsSnapshot};
pub use rules::{AchievementRule, DEFAULT_RULES, StatMetric};
