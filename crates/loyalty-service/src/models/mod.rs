//! 积分与抽奖领域模型
//!
//! 包含账户、积分流水、签到、抽奖与抽奖券等核心实体定义

pub mod account;
pub mod check_in;
pub mod enums;
pub mod raffle;

pub use account::{PointsTransaction, UserAccount};
pub use check_in::{CheckIn, CheckInStats};
pub use enums::{CheckInMethod, DuplicateWindow, PointsReason, RaffleStatus};
pub use raffle::{EntrantSummary, Raffle, RaffleEntry, check_entry_limit};
