//! 业务服务层
//!
//! - `PointsLedger`：积分余额与流水
//! - `CheckInService`：签到、入账与成就
//! - `RaffleEntryLedger`：抽奖券购买与参与者汇总
//! - `RaffleDrawService`：抽奖创建、开奖与取消
//! - `ReconciliationService`：账本对账
//! - `LoyaltyApi`：对外组合接口

mod check_in_service;
pub mod dto;
mod loyalty_api;
mod points_ledger;
mod raffle_draw_service;
mod raffle_entry_service;
mod reconciliation_service;
mod storage;

pub use check_in_service::CheckInService;
pub use loyalty_api::{LoyaltyApi, LoyaltyStores};
pub use points_ledger::PointsLedger;
pub use raffle_draw_service::RaffleDrawService;
pub use raffle_entry_service::RaffleEntryLedger;
pub use reconciliation_service::{
    BalanceDrift, EntryDrift, ReconciliationReport, ReconciliationService, ReconciliationWorker,
};
pub use storage::StorageExecutor;
