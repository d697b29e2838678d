//! 精酿酒馆积分与抽奖服务
//!
//! 用户在合作场馆签到获得积分，积分可兑换抽奖券，抽奖按持券数量加权开奖。
//!
//! ## 核心功能
//!
//! - **积分账本**：余额与流水同步落库，并发写入以版本号乐观控制，余额永不为负
//! - **签到**：按场馆奖励入账，支持按自然日去重，入账失败时补偿
//! - **成就**：基于签到统计的阈值规则，只增不减
//! - **抽奖券**：扣费与发券原子完成，每人限购，支持幂等键
//! - **开奖**：按券号均匀抽取，每个抽奖只能开奖一次
//! - **对账**：校验余额与流水、抽奖计数与抽奖券记录的一致性
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 仓储接口与内存、PostgreSQL 实现
//! - `service`: 业务服务层
//! - `achievement`: 成就规则与评估
//! - `draw`: 加权抽奖与随机源
//! - `venue`: 场馆目录
//! - `notification`: 通知发送
//! - `http`: REST 接口

pub mod achievement;
pub mod draw;
pub mod error;
pub mod http;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;
pub mod settings;
pub mod venue;

pub use achievement::{AchievementEngine, AchievementRule, DEFAULT_RULES, StatsSnapshot};
pub use draw::{EntropySource, FixedFraction, OsEntropy, SeededEntropy, WeightedTable};
pub use error::{LoyaltyError, Result};
pub use models::*;
pub use notification::{NotificationChannel, NotificationSender};
pub use repository::MemoryStore;
pub use service::{
    CheckInService, LoyaltyApi, LoyaltyStores, PointsLedger, RaffleDrawService,
    RaffleEntryLedger, ReconciliationReport, ReconciliationService, ReconciliationWorker, dto,
};
pub use settings::{CheckInPolicy, LoyaltySettings};
pub use venue::{PgVenueDirectory, StaticVenueDirectory, Venue, VenueDirectory};
